//! Concurrent, deduplicated HTTP downloads with streaming verification.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - `data` - Requests, responses and spider tuning
//! - `core` - Pure helpers: status classification, backoff, slot accounting
//! - `effects` - I/O behind the [`HttpClient`] trait, driven by [`WebSpider`]
//!
//! # Key Features
//!
//! - **One download per URL**: concurrent requests sharing a primary or
//!   mirror URL attach to a single network operation and get the same response
//! - **Single-Pass**: bodies are hashed with every configured digest while
//!   they stream to disk
//! - **Bounded**: a global slot pool and a per-host limit, both acquired by
//!   polling so a waiting download never blocks the runtime
//! - **Resumable**: retries against the same URL continue with a `Range`
//!   request and fall back to a full restart when the server ignores it
//!
//! # Example
//!
//! ```no_run
//! use fastpull_fetch::{FetchRequest, ReqwestClient, SpiderConfig, WebSpider};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpiderConfig::default();
//! let spider = WebSpider::new(ReqwestClient::new(&config)?, config);
//! let response = spider
//!     .download(FetchRequest::new("https://example.org/pkg-1.0.tar.gz"))
//!     .await;
//! if let Some(data) = response.final_data() {
//!     println!("{} bytes, sha512 {:?}", data.size(), data.sha512());
//! }
//! # Ok(())
//! # }
//! ```

mod core;
mod data;
mod effects;
mod error;

pub use core::{
    HostSlotGuard, HostSlots, SlotGuard, SlotPool, host_key, is_success_status, is_terminal_status,
    retry_delay,
};
pub use data::{BasicAuth, FetchOutcome, FetchRequest, FetchResponse, SpiderConfig};
pub use effects::{BoxStream, HttpClient, HttpGet, HttpResponse, WebSpider};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestClient;

pub use error::{FetchError, Result};
