use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    parley_agents::{Agent, AgentPool, ChatTicket},
    parley_channels::{ChannelOutbound, InboundSink, RelayOutcome, StreamRelay},
    parley_common::types::{InboundMessage, ReplyTarget},
    tokio_util::task::TaskTracker,
    tracing::{debug, info, warn},
};

use crate::{
    commands::{Command, RELOAD_CONFIRMATION},
    error::Result,
    gate::{AuthGate, UNAUTHORIZED_NOTICE},
};

/// What the dispatcher did with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Sender failed the allow-list; the rejection notice was sent.
    Rejected,
    /// A fixed-reply command was answered.
    Replied(Command),
    /// A reset was queued on the sender's agent.
    Reloading { slot: usize },
    /// A turn was queued on the sender's agent.
    Relaying { slot: usize },
    /// Blank text, nothing to do.
    Ignored,
}

/// Routes inbound messages: gate, then command parsing, then agent
/// selection, in that order.
///
/// Work that has to wait on an agent (sending a turn, resetting a
/// conversation) runs on a tracked task so the dispatch path never blocks
/// behind a busy chat. The task's place in the chat's queue is taken before
/// it is spawned, so same-chat work still runs in arrival order.
/// [`ChatDispatcher::shutdown`] waits for those tasks.
pub struct ChatDispatcher {
    gate: AuthGate,
    pool: Arc<AgentPool>,
    outbound: Arc<dyn ChannelOutbound>,
    relay: Arc<StreamRelay>,
    tasks: TaskTracker,
}

impl ChatDispatcher {
    pub fn new(
        gate: AuthGate,
        pool: Arc<AgentPool>,
        outbound: Arc<dyn ChannelOutbound>,
        edit_interval: Duration,
    ) -> Self {
        let relay = Arc::new(StreamRelay::new(Arc::clone(&outbound), edit_interval));
        Self {
            gate,
            pool,
            outbound,
            relay,
            tasks: TaskTracker::new(),
        }
    }

    /// Number of queued or running agent tasks.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting agent work and wait for queued tasks to finish.
    pub async fn shutdown(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(in_flight = self.tasks.len(), "waiting for in-flight responses");
        }
        self.tasks.wait().await;
    }

    pub async fn handle(&self, message: InboundMessage) -> Result<Dispatched> {
        let target = message.reply_target();

        if !self.gate.admits(&message) {
            info!(user_id = message.sender_id, chat_id = message.chat_id, "unauthorized sender");
            self.outbound.send_text(&target, UNAUTHORIZED_NOTICE).await?;
            return Ok(Dispatched::Rejected);
        }

        if let Some(command) = Command::parse(&message.text) {
            debug!(user_id = message.sender_id, ?command, "command received");
            if let Some(reply) = command.static_reply() {
                self.outbound.send_text(&target, reply).await?;
                return Ok(Dispatched::Replied(command));
            }
            let agent = Arc::clone(self.pool.select(message.sender_id));
            let slot = agent.slot();
            let ticket = agent.enqueue(message.chat_id);
            self.spawn_reload(agent, ticket, target);
            return Ok(Dispatched::Reloading { slot });
        }

        if message.text.trim().is_empty() {
            return Ok(Dispatched::Ignored);
        }

        let agent = Arc::clone(self.pool.select(message.sender_id));
        let slot = agent.slot();
        debug!(user_id = message.sender_id, chat_id = message.chat_id, slot, "dispatching turn");
        let ticket = agent.enqueue(message.chat_id);
        self.spawn_turn(agent, ticket, message, target);
        Ok(Dispatched::Relaying { slot })
    }

    fn spawn_reload(&self, agent: Arc<Agent>, mut ticket: ChatTicket, target: ReplyTarget) {
        let outbound = Arc::clone(&self.outbound);
        self.tasks.spawn(async move {
            let chat_id = ticket.chat_id();
            ticket.ready().await;
            agent.reset(chat_id).await;
            if let Err(e) = outbound.send_text(&target, RELOAD_CONFIRMATION).await {
                warn!(chat_id, error = %e, "could not confirm reload");
            }
        });
    }

    fn spawn_turn(
        &self,
        agent: Arc<Agent>,
        mut ticket: ChatTicket,
        message: InboundMessage,
        target: ReplyTarget,
    ) {
        let outbound = Arc::clone(&self.outbound);
        let relay = Arc::clone(&self.relay);
        self.tasks.spawn(async move {
            let chat_id = message.chat_id;
            if let Err(e) = outbound.send_typing(chat_id).await {
                debug!(chat_id, error = %e, "typing indicator failed");
            }
            ticket.ready().await;

            let fragments = match agent.send(&message.text, chat_id).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(slot = agent.slot(), chat_id, error = %e, "send failed");
                    if let Err(e) = outbound.send_text(&target, &format!("Error: {e}")).await {
                        warn!(chat_id, error = %e, "could not report send failure");
                    }
                    return;
                },
            };

            match relay.relay(&target, fragments).await {
                Ok(report) => match report.outcome {
                    RelayOutcome::Completed => {
                        debug!(slot = agent.slot(), chat_id, edits = report.edits, "response delivered");
                    },
                    RelayOutcome::Failed(error) => {
                        warn!(slot = agent.slot(), chat_id, %error, "response failed mid-stream");
                    },
                },
                Err(e) => warn!(slot = agent.slot(), chat_id, error = %e, "response could not be shown"),
            }
        });
    }
}

#[async_trait]
impl InboundSink for ChatDispatcher {
    async fn dispatch(&self, message: InboundMessage) {
        let chat_id = message.chat_id;
        if let Err(e) = self.handle(message).await {
            warn!(chat_id, error = %e, "failed to handle inbound message");
        }
    }
}
