use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use fastpull_verify::{HashKind, VerificationError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BlosError {
    #[error("lookup is missing required hash kinds: {}", join(.missing))]
    MissingIndex { missing: BTreeSet<HashKind> },

    #[error("{kind} mismatch for object {sha512}: requested {requested}, recorded {recorded}")]
    HashMismatch {
        sha512:    String,
        kind:      HashKind,
        requested: String,
        recorded:  String,
    },

    #[error("object {sha512} is corrupt: {kind} on disk is {actual}, expected {expected}")]
    Corruption {
        sha512:   String,
        kind:     HashKind,
        expected: String,
        actual:   String,
    },

    #[error("invalid sha512 digest {0:?}")]
    InvalidDigest(String),

    #[error("source file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no object {0} in the index")]
    UnknownObject(String),

    #[error("failed to retrieve {url}: {reason}")]
    RetrievalFailure { url: String, reason: String },

    #[error("index rebuild requires the `all` backfill strategy")]
    RebuildDisabled,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] sled::Error),

    #[error("index record encoding error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error(transparent)]
    Fs(#[from] fastpull_fs::Error),

    #[error(transparent)]
    Verify(#[from] VerificationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn join(kinds: &BTreeSet<HashKind>) -> String {
    kinds.iter().map(HashKind::as_str).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, BlosError>;
