use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// One agent slot's upstream session credential.
#[derive(Clone)]
pub struct Credential {
    /// Zero-based pool slot this credential belongs to.
    pub slot: usize,
    pub token: Secret<String>,
    /// File the credential is persisted to.
    pub path: PathBuf,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("slot", &self.slot)
            .field("token", &"[REDACTED]")
            .field("path", &self.path)
            .finish()
    }
}

/// On-disk shape of a slot credential file.
#[derive(Deserialize)]
pub(crate) struct CredentialFile {
    #[serde(default)]
    pub session_token: Option<Secret<String>>,
}

impl CredentialFile {
    /// The stored token, if present and non-blank.
    pub(crate) fn into_token(self) -> Option<Secret<String>> {
        self.session_token
            .filter(|t| !t.expose_secret().trim().is_empty())
    }
}
