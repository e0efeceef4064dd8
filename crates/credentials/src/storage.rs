use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info},
};

use crate::{
    error::{Context, Error, Result},
    types::{Credential, CredentialFile},
};

/// File-based credential storage, one `agent<N>.json` per slot.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credential file for a zero-based slot.
    pub fn path_for(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("agent{}.json", slot + 1))
    }

    /// Load the stored credential for a slot.
    ///
    /// Returns `Ok(None)` when no file exists or it holds no token, and
    /// `Err(Error::Corrupt)` when the file exists but cannot be used.
    pub fn load(&self, slot: usize) -> Result<Option<Credential>> {
        let path = self.path_for(slot);
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), slot, "credential file not found");
                return Ok(None);
            },
            Err(e) => {
                return Err(Error::Corrupt {
                    path,
                    message: e.to_string(),
                });
            },
        };

        if data.trim().is_empty() {
            debug!(path = %path.display(), slot, "credential file is empty");
            return Ok(None);
        }

        let file: CredentialFile = serde_json::from_str(&data).map_err(|e| Error::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(file.into_token().map(|token| {
            debug!(path = %path.display(), slot, "credential loaded");
            Credential { slot, token, path }
        }))
    }

    /// Write a token for a slot and return the resulting credential.
    pub fn persist(&self, slot: usize, token: Secret<String>) -> Result<Credential> {
        let path = self.path_for(slot);
        info!(path = %path.display(), slot, "saving credential");

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create credential dir {}", self.dir.display()))?;

        let data = serde_json::to_string_pretty(&serde_json::json!({
            "session_token": token.expose_secret(),
        }))?;
        std::fs::write(&path, data)
            .with_context(|| format!("write credential file {}", path.display()))?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(Credential { slot, token, path })
    }

    /// Remove the stored credential for a slot, if any.
    pub fn delete(&self, slot: usize) -> Result<()> {
        match std::fs::remove_file(self.path_for(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
