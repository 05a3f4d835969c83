use std::io;

use crate::HashKind;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{kind} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        kind:     HashKind,
        expected: String,
        actual:   String,
    },

    #[error("unknown hash kind: {0}")]
    UnknownHashKind(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VerificationError>;
