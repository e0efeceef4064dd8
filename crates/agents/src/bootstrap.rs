//! Startup: turn configured slots into credentials, then into a pool.

use std::sync::Arc;

use {
    parley_config::SlotLoadPolicy,
    parley_credentials::{Credential, CredentialAcquirer, CredentialStore},
    tracing::{error, info, warn},
};

use crate::{
    agent::Agent,
    error::{Error, Result},
    model::ConversationBackend,
    pool::AgentPool,
};

/// Resolve a credential for each of the first `slots` agent slots.
///
/// A slot with no stored token is filled by `acquirer` and the result is
/// persisted; failure of either step aborts startup. A slot whose stored
/// file cannot be read either ends the scan (`Truncate`, keeping the slots
/// gathered so far) or aborts (`Fail`).
pub async fn load_slot_credentials(
    store: &CredentialStore,
    acquirer: &dyn CredentialAcquirer,
    slots: usize,
    policy: SlotLoadPolicy,
) -> Result<Vec<Credential>> {
    let mut credentials = Vec::with_capacity(slots);

    for slot in 0..slots {
        match store.load(slot) {
            Ok(Some(credential)) => {
                info!(slot, path = %credential.path.display(), "using stored credential");
                credentials.push(credential);
            },
            Ok(None) => {
                info!(slot, "no stored credential, acquiring a new one");
                let token = acquirer
                    .obtain(slot)
                    .await
                    .map_err(|source| Error::CredentialAcquisition { slot, source })?;
                let credential = store
                    .persist(slot, token)
                    .map_err(|source| Error::CredentialPersist { slot, source })?;
                credentials.push(credential);
            },
            Err(source) => match policy {
                SlotLoadPolicy::Truncate => {
                    warn!(
                        slot,
                        error = %source,
                        kept = credentials.len(),
                        "unreadable slot config, not loading further slots"
                    );
                    break;
                },
                SlotLoadPolicy::Fail => {
                    error!(slot, error = %source, "unreadable slot config");
                    return Err(Error::SlotConfig { slot, source });
                },
            },
        }
    }

    Ok(credentials)
}

/// Build an agent per credential, in slot order, and assemble the pool.
pub fn build_pool<F>(credentials: &[Credential], mut backend_for: F) -> Result<AgentPool>
where
    F: FnMut(&Credential) -> Result<Arc<dyn ConversationBackend>>,
{
    let agents = credentials
        .iter()
        .enumerate()
        .map(|(index, credential)| Ok(Agent::new(index, backend_for(credential)?)))
        .collect::<Result<Vec<_>>>()?;
    AgentPool::new(agents)
}
