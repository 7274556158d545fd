//! Error types for AccessChain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Peer unreachable, timed out or answered with garbage.
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Cryptographic error: {0}")]
    Crypto(String),
    /// A join request whose address could not be decrypted with our network key.
    #[error("Decryption error")]
    DecryptionFault,
    #[error("Chain integrity error: {0}")]
    ChainIntegrity(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ChainError {
    /// TransportFaults are tolerated everywhere and never count as an opinion.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
