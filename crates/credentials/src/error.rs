use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A credential file exists but cannot be read or parsed.
    #[error("unreadable credential file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The acquisition flow did not produce a token.
    #[error("credential acquisition failed for slot {slot}: {message}")]
    Acquisition { slot: usize, message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn acquisition(slot: usize, message: impl Into<String>) -> Self {
        Self::Acquisition {
            slot,
            message: message.into(),
        }
    }
}

impl parley_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

parley_common::impl_context!();

pub type Result<T> = std::result::Result<T, Error>;
