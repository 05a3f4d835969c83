//! Incremental multi-algorithm hashing for fetched and stored objects.
//!
//! Computes a configurable set of digests plus the byte size over a stream,
//! one chunk at a time, so hashing can run alongside network I/O without
//! buffering whole payloads.
//!
//! # Example
//!
//! ```
//! use fastpull_verify::{HashKind, MultiHasher};
//!
//! let mut hasher = MultiHasher::new(&[HashKind::Sha512, HashKind::Size]);
//! hasher.update(b"hello ");
//! hasher.update(b"world");
//! let data = hasher.finalize();
//!
//! assert_eq!(data.size(), 11);
//! assert_eq!(data.sha512().map(str::len), Some(128));
//! ```

pub use self::error::{Result, VerificationError};
pub use self::hasher::{Blake2bHasher, DigestHasher, Hasher, Sha256Hasher, Sha512Hasher};
pub use self::kind::HashKind;
pub use self::multi::{CHUNK_SIZE, FinalData, MultiHasher, hash_file, hash_reader};
pub use self::reader::VerifiedReader;

mod error;
mod hasher;
mod kind;
mod multi;
mod reader;
