//! Telegram transport for parley.
//!
//! Long-polls the Bot API with teloxide, hands text messages to an
//! [`InboundSink`](parley_channels::InboundSink) and implements
//! [`ChannelOutbound`](parley_channels::ChannelOutbound) for sends and
//! edit-in-place updates.

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod outbound;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod mock_api;

pub use {
    bot::{PollExit, TelegramBot},
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramOutbound,
};
