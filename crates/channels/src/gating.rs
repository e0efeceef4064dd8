/// Check if a peer is allowed to interact with the bot.
///
/// An empty allowlist means everyone is allowed (open policy).
/// Entries are matched case-insensitively against each of the peer's
/// identifiers (numeric id, username). A leading `@` on usernames is
/// ignored on both sides. Supports exact match and glob-style `*` wildcards.
pub fn is_allowed(identifiers: &[&str], allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    identifiers.iter().any(|peer| {
        let peer_lower = normalize(peer);
        allowlist.iter().any(|pattern| {
            let pat = normalize(pattern);
            if pat.contains('*') {
                glob_match(&pat, &peer_lower)
            } else {
                pat == peer_lower
            }
        })
    })
}

fn normalize(s: &str) -> String {
    s.trim().trim_start_matches('@').to_lowercase()
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                // First segment must match at start
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    // Last segment must match at end (unless pattern ends with *)
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn empty_allowlist_allows_everyone() {
        assert!(is_allowed(&["7"], &[]));
    }

    #[test]
    fn numeric_id_match() {
        let list = vec!["42".into()];
        assert!(is_allowed(&["42", "alice"], &list));
        assert!(!is_allowed(&["7", "bob"], &list));
    }

    #[test]
    fn username_match_ignores_case_and_at() {
        let list = vec!["@Alice".into()];
        assert!(is_allowed(&["7", "alice"], &list));
        assert!(is_allowed(&["7", "ALICE"], &list));
    }

    #[test]
    fn peer_without_username() {
        let list = vec!["alice".into()];
        assert!(!is_allowed(&["7"], &list));
    }

    #[rstest]
    #[case("admin_*", "admin_alice", true)]
    #[case("admin_*", "user_bob", false)]
    #[case("*_bot", "helper_bot", true)]
    #[case("*_bot", "helper_bot_x", false)]
    #[case("user_*_admin", "user_123_admin", true)]
    #[case("user_*_admin", "user_123_mod", false)]
    #[case("12*", "1234", true)]
    fn glob_wildcard(#[case] pattern: &str, #[case] peer: &str, #[case] allowed: bool) {
        assert_eq!(is_allowed(&[peer], &[pattern.to_string()]), allowed);
    }
}
