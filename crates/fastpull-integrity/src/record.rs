use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// Where a logical distfile came from and which object holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    /// Authoritative URL; the record's key within its scope.
    pub url:         String,
    pub mirrors:     Vec<String>,
    /// Last path segment of `url`.
    pub filename:    String,
    pub sha512:      String,
    pub recorded_at: DateTime<Utc>,
}

impl IntegrityRecord {
    pub fn new(url: &str, mirrors: Vec<String>, sha512: &str) -> Self {
        Self {
            url: url.to_string(),
            mirrors,
            filename: filename_of(url),
            sha512: sha512.to_string(),
            recorded_at: Utc::now(),
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> { Ok(postcard::to_allocvec(self)?) }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> { Ok(postcard::from_bytes(bytes)?) }
}

fn filename_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()?
                .next_back()
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).to_string())
}
