//! Error types for the ledger and its client.

use thiserror::Error;

/// Main error type for ledger and connection operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed report, rejected before any mutation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Connection drop or handshake failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Query set rejected by the backend. The connection stays open.
    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Rate limited: {key} ({remaining} remaining)")]
    RateLimited { key: String, remaining: u64 },

    /// An external collaborator (rate counter, claim authority) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection closed")]
    Closed,
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
