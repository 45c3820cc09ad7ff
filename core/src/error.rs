/// Error types for the delivery queue and config sync
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A message kind was routed through the wrong entry point
    #[error("Protocol misuse: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("invalid server id: {0:?}")]
    InvalidServerId(Option<i64>),

    #[error("Account signing key is missing")]
    MissingSigningKey,

    #[error("Not the local account: {0}")]
    NotLocalIdentity(String),

    #[error("Merge engine error: {0}")]
    Engine(String),

    #[error("Timeout error: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, CourierError>;
