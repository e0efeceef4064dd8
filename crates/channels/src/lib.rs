//! Transport-facing traits, allow-list gating and the streaming relay.
//!
//! A transport (Telegram) implements [`ChannelOutbound`] for sending and
//! editing messages and feeds received messages into an [`InboundSink`].
//! [`StreamRelay`] turns a fragment stream into throttled edits of a single
//! outbound message.

pub mod error;
pub mod gating;
pub mod plugin;
pub mod relay;

pub use {
    error::{Error, Result},
    plugin::{ChannelOutbound, InboundSink},
    relay::{RelayOutcome, RelayReport, StreamRelay},
};
