use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No token was stored for a slot and none could be obtained.
    #[error("slot {slot}: could not obtain a credential: {source}")]
    CredentialAcquisition {
        slot: usize,
        #[source]
        source: parley_credentials::Error,
    },

    /// A freshly obtained token could not be written to disk.
    #[error("slot {slot}: could not persist the credential: {source}")]
    CredentialPersist {
        slot: usize,
        #[source]
        source: parley_credentials::Error,
    },

    /// A slot's persisted credential file is unreadable.
    #[error("slot {slot}: unreadable slot config: {source}")]
    SlotConfig {
        slot: usize,
        #[source]
        source: parley_credentials::Error,
    },

    #[error("no usable agents could be started")]
    PoolExhausted,

    /// The upstream refused to exchange the session token for an access token.
    #[error("credential exchange failed: {0}")]
    CredentialExchange(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
