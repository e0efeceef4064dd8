use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

impl Error {
    #[must_use]
    pub fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
