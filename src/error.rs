//! Error types for teebridge

use thiserror::Error;

/// Main error type for teebridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resolution error: {0}")]
    Resolve(String),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Journal error: {0}")]
    Journal(String),
}

/// Result type alias for teebridge
pub type Result<T> = std::result::Result<T, Error>;
