//! Per-slot upstream credentials: file-backed storage plus the flows that
//! obtain a fresh session token when none is stored.

pub mod acquire;
pub mod error;
pub mod storage;
pub mod types;

pub use {
    acquire::{ChainAcquirer, CredentialAcquirer, EnvAcquirer, PromptAcquirer},
    error::{Error, Result},
    storage::CredentialStore,
    types::Credential,
};
