//! Startup validation.

use {secrecy::ExposeSecret, tracing::warn};

use crate::{
    error::{Error, Result},
    schema::{DEFAULT_UPSTREAM_URL, ParleyConfig},
};

/// Fill defaults for blank optional settings and reject unusable ones.
pub fn validate(config: &mut ParleyConfig) -> Result<()> {
    if config.telegram_token.expose_secret().trim().is_empty() {
        return Err(Error::Missing("telegram_token (TELEGRAM_TOKEN)"));
    }
    if config.agent_slots == 0 {
        return Err(Error::invalid_value("agent_slots", "must be at least 1"));
    }
    if config.edit_wait_seconds == 0 {
        warn!("edit_wait_seconds is 0, edits are only bounded by transport rate limits");
    }
    if config.upstream_url.trim().is_empty() {
        config.upstream_url = DEFAULT_UPSTREAM_URL.into();
    }
    config.upstream_url = config.upstream_url.trim_end_matches('/').to_string();
    Ok(())
}
