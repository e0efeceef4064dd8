use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A reply could not be delivered to the transport.
    #[error("could not deliver reply: {0}")]
    Channel(#[from] parley_channels::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
