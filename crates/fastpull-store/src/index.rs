use std::path::Path;

use crate::error::{BlosError, Result};
use crate::record::ObjectRecord;

const OBJECTS: &str = "objects";
const RAND_IDS: &str = "rand_ids";

/// Metadata index over sled.
///
/// `objects` maps sha512 to an encoded [`ObjectRecord`]; `rand_ids` maps a
/// legacy identifier back to its sha512.
pub(crate) struct Index {
    db:       sled::Db,
    objects:  sled::Tree,
    rand_ids: sled::Tree,
}

impl Index {
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .use_compression(true)
            .open()?;
        let objects = db.open_tree(OBJECTS)?;
        let rand_ids = db.open_tree(RAND_IDS)?;
        Ok(Self {
            db,
            objects,
            rand_ids,
        })
    }

    pub(crate) fn db(&self) -> &sled::Db { &self.db }

    pub(crate) fn get(&self, sha512: &str) -> Result<Option<ObjectRecord>> {
        self.objects
            .get(sha512)?
            .map(|bytes| ObjectRecord::decode(&bytes))
            .transpose()
    }

    /// Atomically merges `record` into whatever is stored under `sha512`.
    pub(crate) fn upsert(&self, sha512: &str, record: &ObjectRecord) -> Result<ObjectRecord> {
        self.modify(sha512, |current| {
            Some(match current {
                Some(mut existing) => {
                    existing.absorb(record);
                    existing
                }
                None => record.clone(),
            })
        })?
        .ok_or_else(|| BlosError::UnknownObject(sha512.to_string()))
    }

    /// Applies `change` to an existing record. `None` when there is none.
    pub(crate) fn update(
        &self,
        sha512: &str,
        mut change: impl FnMut(&mut ObjectRecord),
    ) -> Result<Option<ObjectRecord>> {
        self.modify(sha512, |current| {
            current.map(|mut record| {
                change(&mut record);
                record
            })
        })
    }

    /// Read-modify-write through `update_and_fetch`. A record that fails to
    /// decode is left in place and the error returned.
    fn modify(
        &self,
        sha512: &str,
        mut change: impl FnMut(Option<ObjectRecord>) -> Option<ObjectRecord>,
    ) -> Result<Option<ObjectRecord>> {
        let mut failure = None;
        let stored = self.objects.update_and_fetch(sha512, |old| {
            let current = match old.map(ObjectRecord::decode).transpose() {
                Ok(current) => current,
                Err(e) => {
                    failure = Some(e);
                    return old.map(<[u8]>::to_vec);
                }
            };
            match change(current).map(|record| record.encode()).transpose() {
                Ok(encoded) => encoded,
                Err(e) => {
                    failure = Some(e);
                    old.map(<[u8]>::to_vec)
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e);
        }
        stored.map(|bytes| ObjectRecord::decode(&bytes)).transpose()
    }

    /// Drops the record and its rand id binding.
    pub(crate) fn remove(&self, sha512: &str) -> Result<Option<ObjectRecord>> {
        let Some(bytes) = self.objects.remove(sha512)? else {
            return Ok(None);
        };
        let record = ObjectRecord::decode(&bytes)?;
        if let Some(rand_id) = &record.rand_id {
            self.rand_ids.remove(rand_id.as_bytes())?;
        }
        Ok(Some(record))
    }

    pub(crate) fn resolve_rand_id(&self, rand_id: &str) -> Result<Option<String>> {
        Ok(self
            .rand_ids
            .get(rand_id)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub(crate) fn bind_rand_id(&self, rand_id: &str, sha512: &str) -> Result<()> {
        self.rand_ids.insert(rand_id, sha512)?;
        Ok(())
    }

    pub(crate) fn next_id(&self) -> Result<u64> { Ok(self.db.generate_id()?) }

    pub(crate) fn len(&self) -> usize { self.objects.len() }

    pub(crate) fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fastpull_verify::{FinalData, HashKind};

    use super::*;

    fn record(sha512: &str) -> ObjectRecord {
        ObjectRecord::new(&FinalData::new(4).with_digest(HashKind::Sha512, sha512))
    }

    #[test]
    fn upsert_merges_with_existing() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path()).unwrap();

        let mut first = record("ab");
        first.refs.insert("one".into());
        index.upsert("ab", &first).unwrap();

        let mut second = record("ab");
        second.hashes.insert(HashKind::Sha256, "cd".into());
        second.refs.insert("two".into());
        let merged = index.upsert("ab", &second).unwrap();

        assert_eq!(merged.refs.len(), 2);
        assert_eq!(merged.first_seen, first.first_seen);
        assert_eq!(index.get("ab").unwrap(), Some(merged));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn update_ignores_missing_records() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path()).unwrap();
        let changed = index.update("ff", |r| r.size = 9).unwrap();
        assert!(changed.is_none());
        assert!(index.get("ff").unwrap().is_none());
    }

    #[test]
    fn remove_unbinds_rand_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = Index::open(dir.path()).unwrap();
        let mut entry = record("ab");
        entry.rand_id = Some("r1".into());
        index.upsert("ab", &entry).unwrap();
        index.bind_rand_id("r1", "ab").unwrap();

        assert_eq!(index.resolve_rand_id("r1").unwrap().as_deref(), Some("ab"));
        assert!(index.remove("ab").unwrap().is_some());
        assert!(index.resolve_rand_id("r1").unwrap().is_none());
        assert!(index.remove("ab").unwrap().is_none());
    }
}
