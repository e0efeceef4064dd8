use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Default upstream conversation service.
pub const DEFAULT_UPSTREAM_URL: &str = "https://chat.openai.com";

/// What to do when a later agent slot's persisted credential cannot be read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotLoadPolicy {
    /// Stop adding slots and run with the agents built so far.
    #[default]
    Truncate,
    /// Abort startup.
    Fail,
}

impl std::str::FromStr for SlotLoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown slot load policy '{other}' (expected truncate or fail)")),
        }
    }
}

/// Root configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub telegram_token: Secret<String>,

    /// Minimum number of seconds between edits of a streaming reply.
    pub edit_wait_seconds: u64,

    /// Sender IDs or usernames admitted to the bot. Empty admits everyone.
    pub allowlist: Vec<String>,

    /// Number of agent slots to bring up at startup.
    pub agent_slots: usize,

    pub slot_load_policy: SlotLoadPolicy,

    /// Base URL of the upstream conversation service.
    pub upstream_url: String,
}

impl std::fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyConfig")
            .field("telegram_token", &"[REDACTED]")
            .field("edit_wait_seconds", &self.edit_wait_seconds)
            .field("allowlist", &self.allowlist)
            .field("agent_slots", &self.agent_slots)
            .field("slot_load_policy", &self.slot_load_policy)
            .field("upstream_url", &self.upstream_url)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            telegram_token: Secret::new(String::new()),
            edit_wait_seconds: 1,
            allowlist: Vec::new(),
            agent_slots: 3,
            slot_load_policy: SlotLoadPolicy::default(),
            upstream_url: DEFAULT_UPSTREAM_URL.into(),
        }
    }
}

impl ParleyConfig {
    #[must_use]
    pub fn edit_wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.edit_wait_seconds)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = ParleyConfig::default();
        assert_eq!(cfg.edit_wait_seconds, 1);
        assert_eq!(cfg.agent_slots, 3);
        assert_eq!(cfg.slot_load_policy, SlotLoadPolicy::Truncate);
        assert!(cfg.allowlist.is_empty());
        assert_eq!(cfg.upstream_url, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn deserialize_from_toml() {
        let raw = r#"
            telegram_token = "123:ABC"
            edit_wait_seconds = 3
            allowlist = ["42", "alice"]
            slot_load_policy = "fail"
        "#;
        let cfg: ParleyConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.telegram_token.expose_secret(), "123:ABC");
        assert_eq!(cfg.edit_wait_seconds, 3);
        assert_eq!(cfg.allowlist, vec!["42", "alice"]);
        assert_eq!(cfg.slot_load_policy, SlotLoadPolicy::Fail);
        // defaults for unspecified fields
        assert_eq!(cfg.agent_slots, 3);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = ParleyConfig {
            telegram_token: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn slot_load_policy_parses_case_insensitively() {
        assert_eq!("Truncate".parse::<SlotLoadPolicy>(), Ok(SlotLoadPolicy::Truncate));
        assert_eq!(" fail ".parse::<SlotLoadPolicy>(), Ok(SlotLoadPolicy::Fail));
        assert!("ignore".parse::<SlotLoadPolicy>().is_err());
    }
}
