use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use fastpull_verify::HashKind;
use serde::{Deserialize, Serialize};

/// Spider tuning. Every field has a default, so a partial TOML/JSON table
/// deserializes cleanly.
///
/// # Examples
///
/// ```
/// use fastpull_fetch::SpiderConfig;
///
/// let config = SpiderConfig::default().max_per_host(2).max_attempts(5);
/// assert_eq!(config.max_downloads, 200);
/// assert_eq!(config.chunk_size, 256 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiderConfig {
    /// Global download slots.
    pub max_downloads:         usize,
    /// Concurrent downloads against one host.
    pub max_per_host:          usize,
    /// Write buffer size for the body stream.
    pub chunk_size:            usize,
    /// Total attempts per download, first included.
    pub max_attempts:          u32,
    /// Base of the exponential backoff between attempts.
    pub retry_backoff_ms:      u64,
    /// How long to sleep between tries when no slot is free.
    pub slot_poll_interval_ms: u64,
    pub connect_timeout_secs:  u64,
    /// Maximum silence while reading the body.
    pub read_timeout_secs:     u64,
    pub user_agent:            String,
    /// Digests computed for every download.
    pub hashes:                BTreeSet<HashKind>,
    /// Where temp files go. Defaults to the system temp directory.
    pub temp_dir:              Option<PathBuf>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            max_downloads:         200,
            max_per_host:          8,
            chunk_size:            256 * 1024,
            max_attempts:          3,
            retry_backoff_ms:      100,
            slot_poll_interval_ms: 50,
            connect_timeout_secs:  30,
            read_timeout_secs:     60,
            user_agent:            concat!("fastpull/", env!("CARGO_PKG_VERSION")).to_string(),
            hashes:                HashKind::ALL.into_iter().collect(),
            temp_dir:              None,
        }
    }
}

impl SpiderConfig {
    #[must_use]
    pub fn max_downloads(mut self, max_downloads: usize) -> Self {
        self.max_downloads = max_downloads;
        self
    }

    #[must_use]
    pub fn max_per_host(mut self, max_per_host: usize) -> Self {
        self.max_per_host = max_per_host;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn slot_poll_interval(mut self, interval: Duration) -> Self {
        self.slot_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn hashes(mut self, hashes: impl IntoIterator<Item = HashKind>) -> Self {
        self.hashes = hashes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn retry_backoff_duration(&self) -> Duration { Duration::from_millis(self.retry_backoff_ms) }

    pub fn slot_poll_duration(&self) -> Duration {
        Duration::from_millis(self.slot_poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }

    pub fn read_timeout(&self) -> Duration { Duration::from_secs(self.read_timeout_secs) }

    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
