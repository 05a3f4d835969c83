//! Base layer object store (BLOS).
//!
//! Content-addressed storage for fetched files. Objects are named by their
//! sha512 and laid out as `<root>/d[0:2]/d[2:4]/d[4:6]/d`; a sled index
//! records every object's digests, size and back-references.
//!
//! New content arrives through [`Blos::get_url`], which downloads through a
//! shared [`WebSpider`](fastpull_fetch::WebSpider), or through
//! [`Blos::insert_object`] for files already on disk. Consumers retrieve
//! content with [`Blos::get_object`] and never touch the network.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use fastpull_fetch::{FetchRequest, ReqwestClient, SpiderConfig, WebSpider};
//! use fastpull_store::{Blos, BlosConfig};
//! use fastpull_verify::HashKind;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let spider_config = SpiderConfig::default();
//! let spider = WebSpider::new(ReqwestClient::new(&spider_config)?, spider_config);
//! let blos = Blos::new(BlosConfig::new("/var/cache/blos"), spider)?;
//!
//! let object = blos.get_url(FetchRequest::new("https://example.org/pkg-1.0.tar.gz")).await?;
//! let lookup = BTreeMap::from([(HashKind::Sha512, object.digest().to_string())]);
//! assert!(blos.get_object(&lookup)?.is_some());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod index;
mod object;
mod record;
mod store;

pub use config::{BackfillStrategy, BlosConfig, ConfigError};
pub use error::{BlosError, Result};
pub use object::Object;
pub use record::ObjectRecord;
pub use store::{Blos, RebuildReport};
