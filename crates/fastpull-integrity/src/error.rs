use fastpull_store::BlosError;
use fastpull_verify::{HashKind, VerificationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    /// The record transition is not allowed from the current state.
    #[error("cannot update record for {url}: {reason}")]
    UpdateFailure { url: String, reason: String },

    #[error("failed to retrieve {url}: {reason}")]
    RetrievalFailure { url: String, reason: String },

    /// Content was fetched but is not what the caller expected.
    #[error("{url} does not match its expected {kind}: expected {expected}, got {actual}")]
    IntegrityError {
        url:      String,
        kind:     HashKind,
        expected: String,
        actual:   String,
    },

    #[error(transparent)]
    Store(#[from] BlosError),

    #[error(transparent)]
    Verify(#[from] VerificationError),

    #[error("integrity index error: {0}")]
    Index(#[from] sled::Error),

    #[error("integrity record encoding error: {0}")]
    Serialization(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, ScopeError>;
