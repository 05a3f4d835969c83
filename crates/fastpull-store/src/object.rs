use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fastpull_verify::FinalData;

use crate::record::ObjectRecord;

/// Handle to a stored object.
///
/// Holds the digests known when it was produced. The file itself is never
/// modified once stored, but it can disappear through
/// [`Blos::delete_object`](crate::Blos::delete_object) or corruption
/// handling, which [`exists`](Self::exists) reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    sha512:     String,
    path:       PathBuf,
    data:       FinalData,
    first_seen: DateTime<Utc>,
    rand_id:    Option<String>,
}

impl Object {
    pub(crate) fn new(sha512: String, path: PathBuf, record: &ObjectRecord) -> Self {
        Self {
            sha512,
            path,
            data: record.final_data(),
            first_seen: record.first_seen,
            rand_id: record.rand_id.clone(),
        }
    }

    /// Lowercase hex sha512.
    pub fn digest(&self) -> &str { &self.sha512 }

    pub fn path(&self) -> &Path { &self.path }

    pub fn exists(&self) -> bool { self.path.is_file() }

    pub fn size(&self) -> u64 { self.data.size() }

    pub fn hashes(&self) -> &FinalData { &self.data }

    pub fn first_seen(&self) -> DateTime<Utc> { self.first_seen }

    pub fn rand_id(&self) -> Option<&str> { self.rand_id.as_deref() }

    pub fn open(&self) -> io::Result<File> { File::open(&self.path) }
}
