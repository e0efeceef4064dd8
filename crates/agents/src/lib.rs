//! Upstream conversational agents and the fixed pool that serves them.
//!
//! An [`Agent`] wraps one upstream session (a [`ConversationBackend`]) and
//! keeps a [`ConversationSession`] per chat. The [`AgentPool`] assigns each
//! requester to an agent by `requester mod pool size`.

pub mod agent;
pub mod bootstrap;
pub mod error;
pub mod model;
pub mod pool;
pub mod providers;
pub mod session;

pub use {
    agent::{Agent, ChatTicket},
    bootstrap::{build_pool, load_slot_credentials},
    error::{Error, Result},
    model::{ConversationBackend, FragmentStream, TurnRequest, UpstreamEvent, UpstreamStream},
    pool::AgentPool,
    session::{Continuation, ConversationSession},
};
