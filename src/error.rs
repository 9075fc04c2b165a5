use thiserror::Error;

use crate::signaling::SignalingError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("Peer error: {0}")]
    Peer(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, ViewerError>;
