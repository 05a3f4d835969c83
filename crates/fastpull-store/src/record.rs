use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use fastpull_verify::{FinalData, HashKind};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Index entry for one stored object, keyed by its sha512.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Lowercase hex digests. `size` lives in its own field.
    pub hashes:     BTreeMap<HashKind, String>,
    pub size:       u64,
    pub first_seen: DateTime<Utc>,
    /// Legacy secondary identifier.
    pub rand_id:    Option<String>,
    /// Logical names pointing at this object.
    pub refs:       BTreeSet<String>,
}

impl ObjectRecord {
    pub fn new(data: &FinalData) -> Self {
        Self {
            hashes:     data.digests().clone(),
            size:       data.size(),
            first_seen: Utc::now(),
            rand_id:    None,
            refs:       BTreeSet::new(),
        }
    }

    pub fn sha512(&self) -> Option<&str> { self.hashes.get(&HashKind::Sha512).map(String::as_str) }

    pub fn final_data(&self) -> FinalData {
        self.hashes
            .iter()
            .fold(FinalData::new(self.size), |data, (kind, hex)| data.with_digest(*kind, hex))
    }

    /// Folds `newer` into this record. Digests already recorded, the
    /// earliest first-seen time and an existing rand id are kept.
    pub fn absorb(&mut self, newer: &ObjectRecord) {
        for (kind, hex) in &newer.hashes {
            self.hashes.entry(*kind).or_insert_with(|| hex.clone());
        }
        self.first_seen = self.first_seen.min(newer.first_seen);
        if self.rand_id.is_none() {
            self.rand_id.clone_from(&newer.rand_id);
        }
        self.refs.extend(newer.refs.iter().cloned());
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> { Ok(postcard::to_allocvec(self)?) }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> { Ok(postcard::from_bytes(bytes)?) }
}
