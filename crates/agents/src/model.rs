use std::pin::Pin;

use {async_trait::async_trait, futures::Stream, parley_common::types::Fragment};

use crate::{error::Result, session::Continuation};

/// One user turn sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub text: String,
    /// Linkage to the previous turn; `None` starts a fresh conversation.
    pub continuation: Option<Continuation>,
}

/// Event emitted by an upstream backend while a turn streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Text appended to the assistant reply.
    Delta(String),
    /// The turn finished; carries the ids to continue from.
    Completed {
        conversation_id: String,
        turn_id: String,
    },
    /// The turn failed mid-stream.
    Failed(String),
}

/// Lazy sequence of upstream events for one turn.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = UpstreamEvent> + Send>>;

/// Lazy sequence of fragments handed to the relay.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// An upstream conversational service bound to one credential.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Start a turn.
    ///
    /// Errors returned here mean the turn never started (rejected request,
    /// credential problems). Failures after the first byte arrive in-band
    /// as [`UpstreamEvent::Failed`].
    async fn converse(&self, request: TurnRequest) -> Result<UpstreamStream>;
}
