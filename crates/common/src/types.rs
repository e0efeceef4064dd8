//! Transport-neutral message types shared by the agent, relay and channel
//! layers.

use serde::{Deserialize, Serialize};

/// Numeric identity of the person who sent a message.
pub type UserId = i64;

/// Numeric identity of a chat (DM or group).
pub type ChatId = i64;

/// One incremental piece of a streamed response.
///
/// A well-formed sequence is any number of `Delta`s followed by exactly one
/// terminal element (`Done` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text to append to the response.
    Delta(String),
    /// The response completed successfully.
    Done,
    /// The response failed; carries human-readable details.
    Error(String),
}

impl Fragment {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// A text message received from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: i32,
    pub sender_id: UserId,
    pub sender_username: Option<String>,
    pub text: String,
}

impl InboundMessage {
    /// Where replies to this message should go.
    #[must_use]
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            chat_id: self.chat_id,
            reply_to: Some(self.message_id),
        }
    }
}

/// Where an outbound message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub chat_id: ChatId,
    /// Message being replied to, when the transport supports threading.
    pub reply_to: Option<i32>,
}

/// Handle to a message already delivered by a transport, used for edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i32,
}
