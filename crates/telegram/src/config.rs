use std::{fmt, time::Duration};

use {reqwest::Url, secrecy::Secret};

/// Long-poll timeout passed to `getUpdates`, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;

/// Connection settings for the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,
    /// Alternate Bot API server, e.g. a self-hosted `telegram-bot-api`.
    pub api_url: Option<Url>,
    pub poll_timeout_secs: u32,
    /// HTTP client timeout. Must exceed the long-poll timeout or every idle
    /// poll aborts client-side.
    pub client_timeout: Duration,
    /// Pause after a failed poll before trying again.
    pub error_backoff: Duration,
    /// Commands registered for autocomplete, as `(name, description)`.
    pub commands: Vec<(String, String)>,
}

impl TelegramConfig {
    pub fn new(token: Secret<String>) -> Self {
        Self {
            token,
            api_url: None,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            client_timeout: Duration::from_secs(u64::from(DEFAULT_POLL_TIMEOUT_SECS) + 15),
            error_backoff: Duration::from_secs(5),
            commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_commands<'a>(
        mut self,
        commands: impl IntoIterator<Item = &'a (&'a str, &'a str)>,
    ) -> Self {
        self.commands = commands
            .into_iter()
            .map(|(name, description)| ((*name).to_string(), (*description).to_string()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = Some(url);
        self
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_timeout_outlasts_long_poll() {
        let config = TelegramConfig::new(Secret::new("123:abc".into()));
        assert!(config.client_timeout > Duration::from_secs(u64::from(config.poll_timeout_secs)));
    }

    #[test]
    fn debug_redacts_token() {
        let config = TelegramConfig::new(Secret::new("123:super-secret".into()))
            .with_commands(&[("help", "Show help")]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(config.commands, vec![("help".to_string(), "Show help".to_string())]);
    }
}
