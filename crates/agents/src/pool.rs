use std::sync::Arc;

use {parley_common::types::UserId, tracing::info};

use crate::{
    agent::Agent,
    error::{Error, Result},
};

/// Fixed, ordered set of agents fronting separate upstream sessions.
///
/// Membership never changes after construction. Requesters are assigned by
/// `user_id mod len`, so a given user always lands on the same agent while
/// the pool size stays the same.
pub struct AgentPool {
    agents: Vec<Arc<Agent>>,
}

impl AgentPool {
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::PoolExhausted);
        }
        info!(size = agents.len(), "agent pool ready");
        Ok(Self {
            agents: agents.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Always false; an empty pool cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Index of the agent serving `user_id`.
    ///
    /// Uses Euclidean remainder so negative ids still map into range.
    pub fn slot_for(&self, user_id: UserId) -> usize {
        let len = self.agents.len() as i64;
        user_id.rem_euclid(len) as usize
    }

    pub fn select(&self, user_id: UserId) -> &Arc<Agent> {
        &self.agents[self.slot_for(user_id)]
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }
}
