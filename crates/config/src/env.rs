//! Environment variable overrides.

use {secrecy::Secret, tracing::debug};

use crate::{
    error::{Error, Result},
    schema::ParleyConfig,
};

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const ENV_EDIT_WAIT_SECONDS: &str = "EDIT_WAIT_SECONDS";
pub const ENV_ALLOWLIST: &str = "TELEGRAM_ID";
pub const ENV_AGENT_SLOTS: &str = "PARLEY_AGENT_SLOTS";
pub const ENV_SLOT_LOAD_POLICY: &str = "PARLEY_SLOT_LOAD_POLICY";
pub const ENV_UPSTREAM_URL: &str = "PARLEY_UPSTREAM_URL";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut ParleyConfig) -> Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply overrides using a custom lookup function.
///
/// Separate from [`apply_env_overrides`] so it can be tested without
/// mutating the process environment. Empty values are treated as unset.
pub fn apply_env_overrides_with(
    config: &mut ParleyConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get(ENV_TELEGRAM_TOKEN) {
        config.telegram_token = Secret::new(token.trim().to_string());
    }
    if let Some(raw) = get(ENV_EDIT_WAIT_SECONDS) {
        config.edit_wait_seconds = raw
            .trim()
            .parse()
            .map_err(|e| Error::invalid_value(ENV_EDIT_WAIT_SECONDS, format!("{raw}: {e}")))?;
    }
    if let Some(raw) = get(ENV_ALLOWLIST) {
        config.allowlist = parse_allowlist(&raw);
    }
    if let Some(raw) = get(ENV_AGENT_SLOTS) {
        config.agent_slots = raw
            .trim()
            .parse()
            .map_err(|e| Error::invalid_value(ENV_AGENT_SLOTS, format!("{raw}: {e}")))?;
    }
    if let Some(raw) = get(ENV_SLOT_LOAD_POLICY) {
        config.slot_load_policy = raw
            .parse()
            .map_err(|e: String| Error::invalid_value(ENV_SLOT_LOAD_POLICY, e))?;
    }
    if let Some(url) = get(ENV_UPSTREAM_URL) {
        config.upstream_url = url.trim().to_string();
    }

    debug!(?config, "applied environment overrides");
    Ok(())
}

/// Split a comma-separated allow-list, dropping blanks.
pub fn parse_allowlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::SlotLoadPolicy, secrecy::ExposeSecret, std::collections::HashMap};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overrides_every_field() {
        let mut cfg = ParleyConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            lookup_from(&[
                (ENV_TELEGRAM_TOKEN, "123:ABC"),
                (ENV_EDIT_WAIT_SECONDS, "5"),
                (ENV_ALLOWLIST, "42, 7 ,,alice"),
                (ENV_AGENT_SLOTS, "2"),
                (ENV_SLOT_LOAD_POLICY, "fail"),
                (ENV_UPSTREAM_URL, "http://localhost:9000"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.telegram_token.expose_secret(), "123:ABC");
        assert_eq!(cfg.edit_wait_seconds, 5);
        assert_eq!(cfg.allowlist, vec!["42", "7", "alice"]);
        assert_eq!(cfg.agent_slots, 2);
        assert_eq!(cfg.slot_load_policy, SlotLoadPolicy::Fail);
        assert_eq!(cfg.upstream_url, "http://localhost:9000");
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut cfg = ParleyConfig::default();
        apply_env_overrides_with(
            &mut cfg,
            lookup_from(&[(ENV_EDIT_WAIT_SECONDS, ""), (ENV_ALLOWLIST, "  ")]),
        )
        .unwrap();
        assert_eq!(cfg.edit_wait_seconds, 1);
        assert!(cfg.allowlist.is_empty());
    }

    #[test]
    fn rejects_non_numeric_edit_wait() {
        let mut cfg = ParleyConfig::default();
        let err = apply_env_overrides_with(&mut cfg, lookup_from(&[(ENV_EDIT_WAIT_SECONDS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_EDIT_WAIT_SECONDS));
    }

    #[test]
    fn allowlist_parsing_drops_blanks() {
        assert_eq!(parse_allowlist("1,2"), vec!["1", "2"]);
        assert!(parse_allowlist(" , ").is_empty());
    }
}
