//! Error types for fastpull-fetch.
//!
//! These classify individual attempts inside the spider. They never cross the
//! [`WebSpider::download`](crate::WebSpider::download) boundary, which reports
//! failures in-band through [`FetchResponse`](crate::FetchResponse).

use std::io;

use fastpull_verify::VerificationError;
use thiserror::Error;

use crate::core::is_terminal_status;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error from {url}: {message}")]
    Network { url: String, message: String },

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("digest mismatch: {0}")]
    Digest(#[from] VerificationError),

    #[error("download task ended without a result")]
    Abandoned,
}

impl FetchError {
    /// Whether another attempt could succeed.
    ///
    /// Terminal statuses (400, 404, 410), malformed URLs, local I/O failures
    /// and digest mismatches are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => !is_terminal_status(*status),
            FetchError::Network { .. } => true,
            FetchError::InvalidUrl { .. }
            | FetchError::Io(_)
            | FetchError::Digest(_)
            | FetchError::Abandoned => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> FetchError {
        FetchError::HttpStatus {
            url: "https://example.org/a".into(),
            status,
        }
    }

    #[test]
    fn terminal_statuses_are_not_retryable() {
        for code in [400, 404, 410] {
            assert!(!status(code).is_retryable(), "{code} should be terminal");
        }
    }

    #[test]
    fn other_statuses_are_retryable() {
        for code in [401, 403, 416, 429, 500, 502, 503, 504] {
            assert!(status(code).is_retryable(), "{code} should be retried");
        }
    }

    #[test]
    fn network_errors_are_retryable() {
        let err = FetchError::Network {
            url:     "https://example.org/a".into(),
            message: "connection reset".into(),
        };
        assert!(err.is_retryable());
        assert!(!FetchError::Abandoned.is_retryable());
    }
}
