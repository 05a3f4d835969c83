//! Distfile integrity index.
//!
//! Maps the authoritative URL of a distfile, within one
//! (release, kit, branch) scope, to the sha512 of the object that holds it in
//! the [`Blos`](fastpull_store::Blos). Generated package metadata can then
//! name content by digest while the scope remembers where it came from.
//!
//! Records live in an `integrity` tree inside the store's own sled database.

mod error;
mod record;
mod scope;

pub use error::{Result, ScopeError};
pub use record::IntegrityRecord;
pub use scope::{IntegrityDatabase, IntegrityScope};
