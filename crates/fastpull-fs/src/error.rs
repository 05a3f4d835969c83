use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("cross-device hardlink not supported")]
    CrossDeviceHardlink,

    #[error("invalid digest {0:?}: expected at least 6 lowercase hex characters")]
    InvalidDigest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
