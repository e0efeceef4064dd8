use std::time::SystemTime;

use parley_common::types::ChatId;

/// Ids needed to continue an upstream conversation.
///
/// Kept as one value so the conversation id and the last turn id are
/// always set or cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub conversation_id: String,
    pub last_turn_id: String,
}

/// Continuation state for one chat on one agent.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    chat_id: ChatId,
    continuation: Option<Continuation>,
    last_activity: Option<SystemTime>,
}

impl ConversationSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            continuation: None,
            last_activity: None,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn continuation(&self) -> Option<&Continuation> {
        self.continuation.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.continuation
            .as_ref()
            .map(|c| c.conversation_id.as_str())
    }

    pub fn last_turn_id(&self) -> Option<&str> {
        self.continuation.as_ref().map(|c| c.last_turn_id.as_str())
    }

    pub fn last_activity(&self) -> Option<SystemTime> {
        self.last_activity
    }

    /// Record a completed exchange.
    pub fn record_turn(&mut self, conversation_id: String, turn_id: String) {
        self.continuation = Some(Continuation {
            conversation_id,
            last_turn_id: turn_id,
        });
        self.last_activity = Some(SystemTime::now());
    }

    /// Forget the upstream conversation. Returns whether one was active.
    pub fn reset(&mut self) -> bool {
        self.last_activity = None;
        self.continuation.take().is_some()
    }
}
