//! Immutable data types for fetching: requests, responses and tuning.

pub mod config;
pub mod request;
pub mod response;

pub use config::SpiderConfig;
pub use request::{BasicAuth, FetchRequest};
pub use response::{FetchOutcome, FetchResponse};
