use {
    parley_channels::gating::is_allowed,
    parley_common::types::InboundMessage,
    tracing::{debug, info},
};

/// Reply sent to senders who are not on the allow-list.
pub const UNAUTHORIZED_NOTICE: &str = "You are not authorized to use this bot.";

/// Decides whether an inbound sender may use the bot.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    allowlist: Vec<String>,
}

impl AuthGate {
    pub fn new(allowlist: Vec<String>) -> Self {
        if allowlist.is_empty() {
            info!("no allow-list configured, bot is open to everyone");
        } else {
            info!(entries = allowlist.len(), "allow-list active");
        }
        Self { allowlist }
    }

    /// True when every sender is admitted.
    pub fn is_open(&self) -> bool {
        self.allowlist.is_empty()
    }

    /// Check the sender's numeric id and, when present, username.
    pub fn admits(&self, message: &InboundMessage) -> bool {
        let id = message.sender_id.to_string();
        let mut identifiers = vec![id.as_str()];
        if let Some(username) = message.sender_username.as_deref() {
            identifiers.push(username);
        }
        let allowed = is_allowed(&identifiers, &self.allowlist);
        if !allowed {
            debug!(
                user_id = message.sender_id,
                username = ?message.sender_username,
                "sender not on allow-list"
            );
        }
        allowed
    }
}
