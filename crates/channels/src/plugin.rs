use {
    async_trait::async_trait,
    parley_common::types::{ChatId, InboundMessage, MessageRef, ReplyTarget},
};

use crate::error::Result;

/// Send and edit messages on a transport.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Send a new message and return a handle that can be edited later.
    async fn send_text(&self, to: &ReplyTarget, text: &str) -> Result<MessageRef>;

    /// Replace the content of a previously sent message.
    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
        Ok(())
    }
}

/// Receives inbound messages from a transport, in arrival order.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn dispatch(&self, message: InboundMessage);
}
