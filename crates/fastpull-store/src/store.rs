use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use fastpull_fetch::{FetchOutcome, FetchRequest, HttpClient, WebSpider};
use fastpull_fs::{HardlinkOrCopyOptions, LinkOutcome, prune_empty_parents, remove_file_if_exists};
use fastpull_verify::{FinalData, HashKind, hash_file};
use tracing::{debug, info, warn};

use crate::config::{BackfillStrategy, BlosConfig};
use crate::error::{BlosError, Result};
use crate::index::Index;
use crate::object::Object;
use crate::record::ObjectRecord;

/// Outcome of [`Blos::rebuild_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Files whose record was written or refreshed.
    pub indexed: usize,
    /// Files whose content did not match their name and were deleted.
    pub removed: usize,
}

/// Base layer object store.
///
/// Files live in a sharded layout keyed by lowercase sha512 and are
/// described by a sled metadata index. Lookups verify against disk; a file
/// that no longer matches its record is deleted together with the record.
///
/// `get_object` and `insert_object` do blocking file I/O. Async callers that
/// care can run them on `spawn_blocking`.
pub struct Blos<C> {
    config: BlosConfig,
    index:  Index,
    spider: WebSpider<C>,
}

impl<C> Blos<C> {
    pub fn config(&self) -> &BlosConfig { &self.config }

    pub fn root(&self) -> &Path { &self.config.root }

    pub fn spider(&self) -> &WebSpider<C> { &self.spider }

    /// The sled database backing the index, for components that keep their
    /// own trees next to it.
    pub fn database(&self) -> &sled::Db { self.index.db() }

    /// Number of indexed objects.
    pub fn len(&self) -> usize { self.index.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn flush(&self) -> Result<()> { self.index.flush() }

    /// Looks up an object by digests.
    ///
    /// Every kind in `req_client_hashes` must be supplied. Supplied kinds the
    /// record also carries must agree with it; kinds it lacks are ignored.
    /// Returns `Ok(None)` when the object is unknown, or known but gone from
    /// disk.
    pub fn get_object(&self, hashes: &BTreeMap<HashKind, String>) -> Result<Option<Object>> {
        let missing: BTreeSet<HashKind> = self
            .config
            .req_client_hashes
            .iter()
            .copied()
            .filter(|kind| !hashes.contains_key(kind))
            .collect();
        let sha512 = match hashes.get(&HashKind::Sha512) {
            Some(value) if missing.is_empty() => parse_sha512(value)?,
            _ => {
                let mut missing = missing;
                missing.insert(HashKind::Sha512);
                return Err(BlosError::MissingIndex { missing });
            }
        };
        self.lookup(&sha512, hashes)
    }

    /// Looks up an object by sha512 alone.
    pub fn object(&self, sha512: &str) -> Result<Option<Object>> {
        let sha512 = parse_sha512(sha512)?;
        self.lookup(&sha512, &BTreeMap::new())
    }

    /// Stores the file at `temp_path` and returns its object.
    ///
    /// `final_data` is trusted when it carries every `req_blos_hashes` kind;
    /// otherwise the file is hashed and must agree with whatever was
    /// supplied. The file is hardlinked (copied across devices) so the
    /// caller keeps ownership of `temp_path`. Storing content that is already
    /// present is not an error.
    pub fn insert_object(&self, temp_path: &Path, final_data: Option<&FinalData>) -> Result<Object> {
        if !temp_path.is_file() {
            return self.already_stored(temp_path, final_data);
        }

        let data = match final_data {
            Some(data) if data.missing(&self.config.req_blos_hashes).is_empty() => data.clone(),
            _ => {
                let mut kinds = self.config.desired_hashes.clone();
                if let Some(claimed) = final_data {
                    kinds.extend(claimed.kinds());
                }
                let computed = hash_file(temp_path, &kinds)?;
                if let Some(claimed) = final_data {
                    computed.compare(claimed.digests())?;
                }
                computed
            }
        };

        let sha512 = parse_sha512(data.sha512().unwrap_or_default())?;
        let dest = self.object_path(&sha512)?;
        let outcome = match fastpull_fs::link_object(
            &self.config.root,
            &sha512,
            temp_path,
            HardlinkOrCopyOptions::default(),
        ) {
            Ok(outcome) => outcome,
            Err(fastpull_fs::Error::SourceNotFound(_)) if dest.is_file() => LinkOutcome::AlreadyPresent,
            Err(fastpull_fs::Error::SourceNotFound(path)) => return Err(BlosError::FileNotFound(path)),
            Err(e) => return Err(e.into()),
        };

        let record = self.index.upsert(&sha512, &ObjectRecord::new(&data))?;
        debug!(digest = %sha512, ?outcome, size = data.size(), "stored object");
        Ok(Object::new(sha512, dest, &record))
    }

    /// A vanished source is fine when a concurrent insert already placed the
    /// same content.
    fn already_stored(&self, temp_path: &Path, final_data: Option<&FinalData>) -> Result<Object> {
        let not_found = || BlosError::FileNotFound(temp_path.to_path_buf());
        let Some(data) = final_data.filter(|d| d.missing(&self.config.req_blos_hashes).is_empty())
        else {
            return Err(not_found());
        };
        let sha512 = parse_sha512(data.sha512().unwrap_or_default())?;
        let dest = self.object_path(&sha512)?;
        if !dest.is_file() {
            return Err(not_found());
        }
        let record = self.index.upsert(&sha512, &ObjectRecord::new(data))?;
        Ok(Object::new(sha512, dest, &record))
    }

    /// Resolves a legacy secondary identifier.
    pub fn get_object_by_rand_id(&self, rand_id: &str) -> Result<Option<Object>> {
        match self.index.resolve_rand_id(rand_id)? {
            Some(sha512) => self.lookup(&sha512, &BTreeMap::new()),
            None => Ok(None),
        }
    }

    /// Returns the object's secondary identifier, allocating one if needed.
    ///
    /// Identifiers come from the index's id generator: unique for the
    /// lifetime of the index, not random.
    pub fn assign_rand_id(&self, sha512: &str) -> Result<String> {
        let sha512 = parse_sha512(sha512)?;
        let unknown = || BlosError::UnknownObject(sha512.clone());
        let record = self.index.get(&sha512)?.ok_or_else(unknown)?;
        if let Some(rand_id) = record.rand_id {
            return Ok(rand_id);
        }

        let candidate = format!("{:016x}", self.index.next_id()?);
        let updated = self
            .index
            .update(&sha512, |record| {
                if record.rand_id.is_none() {
                    record.rand_id = Some(candidate.clone());
                }
            })?
            .ok_or_else(unknown)?;
        let rand_id = updated.rand_id.unwrap_or(candidate);
        self.index.bind_rand_id(&rand_id, &sha512)?;
        Ok(rand_id)
    }

    /// Removes the file and its record. `false` when neither existed.
    pub fn delete_object(&self, sha512: &str) -> Result<bool> {
        let sha512 = parse_sha512(sha512)?;
        let path = self.object_path(&sha512)?;
        let removed_file = remove_file_if_exists(&path)?;
        if removed_file {
            prune_empty_parents(&path, &self.config.root);
        }
        let removed_record = self.index.remove(&sha512)?.is_some();
        if removed_file || removed_record {
            info!(digest = %sha512, "deleted object");
        }
        Ok(removed_file || removed_record)
    }

    /// Records that `name` refers to the object.
    pub fn add_ref(&self, sha512: &str, name: &str) -> Result<()> {
        let sha512 = parse_sha512(sha512)?;
        self.index
            .update(&sha512, |record| {
                record.refs.insert(name.to_string());
            })?
            .map(|_| ())
            .ok_or(BlosError::UnknownObject(sha512))
    }

    /// Drops a back-reference. `false` when it was not there.
    pub fn remove_ref(&self, sha512: &str, name: &str) -> Result<bool> {
        let sha512 = parse_sha512(sha512)?;
        let mut removed = false;
        self.index.update(&sha512, |record| removed = record.refs.remove(name))?;
        Ok(removed)
    }

    /// Re-creates records for every file in the layout, hashing each with
    /// every supported kind. Files whose content does not match their name
    /// are deleted.
    ///
    /// Only allowed under [`BackfillStrategy::All`], since it is a full
    /// backfill of the store.
    pub fn rebuild_index(&self) -> Result<RebuildReport> {
        if self.config.backfill != BackfillStrategy::All {
            return Err(BlosError::RebuildDisabled);
        }

        let kinds: BTreeSet<HashKind> = HashKind::ALL.into();
        let mut report = RebuildReport::default();
        for entry in fastpull_fs::walk_objects(&self.config.root) {
            let (name, path) = entry?;
            let Ok(sha512) = parse_sha512(&name) else {
                debug!(path = %path.display(), "skipping file with a non-sha512 name");
                continue;
            };
            let computed = hash_file(&path, &kinds)?;
            if computed.sha512() != Some(sha512.as_str()) {
                warn!(digest = %sha512, actual = ?computed.sha512(), "object content does not match its name");
                self.discard(&sha512, &path);
                report.removed += 1;
                continue;
            }
            self.index.upsert(&sha512, &ObjectRecord::new(&computed))?;
            report.indexed += 1;
        }
        self.index.flush()?;
        info!(indexed = report.indexed, removed = report.removed, "rebuilt object index");
        Ok(report)
    }

    fn lookup(&self, sha512: &str, requested: &BTreeMap<HashKind, String>) -> Result<Option<Object>> {
        let path = self.object_path(sha512)?;
        match self.index.get(sha512)? {
            Some(record) => self.verify_recorded(sha512, path, record, requested),
            None => self.backfill_unrecorded(sha512, path, requested),
        }
    }

    fn verify_recorded(
        &self,
        sha512: &str,
        path: PathBuf,
        record: ObjectRecord,
        requested: &BTreeMap<HashKind, String>,
    ) -> Result<Option<Object>> {
        let recorded = record.final_data();
        check_requested(sha512, &recorded, requested)?;

        if !path.is_file() {
            warn!(digest = %sha512, "indexed object is missing from disk, dropping its record");
            self.index.remove(sha512)?;
            return Ok(None);
        }

        let backfill = self.backfill_kinds(&recorded);
        let pass: BTreeSet<HashKind> = self.config.disk_verify.union(&backfill).copied().collect();
        if pass.is_empty() {
            return Ok(Some(Object::new(sha512.to_string(), path, &record)));
        }

        let computed = hash_file(&path, &pass)?;
        for kind in &self.config.disk_verify {
            if let (Some(expected), Some(actual)) = (recorded.get(*kind), computed.get(*kind)) {
                if expected != actual {
                    return Err(self.corrupt(sha512, &path, *kind, expected, actual));
                }
            }
        }

        let record = if backfill.is_empty() {
            record
        } else {
            debug!(digest = %sha512, kinds = ?backfill, "backfilled missing hashes");
            self.index.upsert(sha512, &ObjectRecord::new(&computed))?
        };
        Ok(Some(Object::new(sha512.to_string(), path, &record)))
    }

    fn backfill_unrecorded(
        &self,
        sha512: &str,
        path: PathBuf,
        requested: &BTreeMap<HashKind, String>,
    ) -> Result<Option<Object>> {
        let kinds: BTreeSet<HashKind> = match self.config.backfill {
            BackfillStrategy::None => return Ok(None),
            BackfillStrategy::Desired => self.config.desired_hashes.clone(),
            BackfillStrategy::All => HashKind::ALL.into(),
        };
        if !path.is_file() {
            return Ok(None);
        }

        let computed = hash_file(&path, &kinds)?;
        let actual = computed.sha512().unwrap_or_default();
        if actual != sha512 {
            let actual = actual.to_string();
            return Err(self.corrupt(sha512, &path, HashKind::Sha512, sha512.to_string(), actual));
        }
        check_requested(sha512, &computed, requested)?;

        let record = self.index.upsert(sha512, &ObjectRecord::new(&computed))?;
        info!(digest = %sha512, "indexed unrecorded object found on disk");
        Ok(Some(Object::new(sha512.to_string(), path, &record)))
    }

    /// Kinds the policy wants computed that `recorded` lacks.
    fn backfill_kinds(&self, recorded: &FinalData) -> BTreeSet<HashKind> {
        match self.config.backfill {
            BackfillStrategy::None => BTreeSet::new(),
            BackfillStrategy::Desired => recorded.missing(&self.config.desired_hashes),
            BackfillStrategy::All => recorded.missing(&HashKind::ALL),
        }
    }

    fn corrupt(
        &self,
        sha512: &str,
        path: &Path,
        kind: HashKind,
        expected: String,
        actual: String,
    ) -> BlosError {
        warn!(digest = %sha512, %kind, %expected, %actual, "object failed disk verification, removing");
        self.discard(sha512, path);
        BlosError::Corruption {
            sha512: sha512.to_string(),
            kind,
            expected,
            actual,
        }
    }

    /// Best-effort removal of a bad object.
    fn discard(&self, sha512: &str, path: &Path) {
        match remove_file_if_exists(path) {
            Ok(_) => prune_empty_parents(path, &self.config.root),
            Err(e) => warn!(digest = %sha512, error = %e, "failed to remove object file"),
        }
        if let Err(e) = self.index.remove(sha512) {
            warn!(digest = %sha512, error = %e, "failed to remove object record");
        }
    }

    fn object_path(&self, sha512: &str) -> Result<PathBuf> {
        Ok(fastpull_fs::object_path(&self.config.root, sha512)?)
    }
}

impl<C: HttpClient + 'static> Blos<C> {
    /// Opens (or creates) the store described by `config`.
    pub fn new(config: BlosConfig, spider: WebSpider<C>) -> Result<Self> {
        let config = config.normalized();
        std::fs::create_dir_all(&config.root)?;
        let index = Index::open(config.resolved_index_dir())?;
        info!(
            root = %config.root.display(),
            backfill = ?config.backfill,
            objects = index.len(),
            "opened object store"
        );
        Ok(Self {
            config,
            index,
            spider,
        })
    }

    /// Downloads `request` through the spider and stores the result.
    ///
    /// Concurrent calls for the same URL share one download. The temp file
    /// is removed once every caller has stored it.
    pub async fn get_url(&self, request: FetchRequest) -> Result<Object> {
        let url = request.url.clone();
        let response = self.spider.download(request).await;
        match (response.outcome(), response.temp_path()) {
            (FetchOutcome::Success { final_data, .. }, Some(temp)) => {
                let object = self.insert_object(temp, Some(final_data))?;
                info!(url = %url, digest = %object.digest(), size = object.size(), "retrieved object");
                Ok(object)
            }
            (FetchOutcome::Failure { reason }, _) => Err(BlosError::RetrievalFailure {
                url,
                reason: reason.clone(),
            }),
            (FetchOutcome::Success { .. }, None) => Err(BlosError::RetrievalFailure {
                url,
                reason: "download produced no file".to_string(),
            }),
        }
    }
}

/// Validates and lowercases a sha512 hex digest.
fn parse_sha512(value: &str) -> Result<String> {
    let digest = value.trim().to_ascii_lowercase();
    if Some(digest.len()) == HashKind::Sha512.hex_len()
        && digest.bytes().all(|b| b.is_ascii_hexdigit())
    {
        Ok(digest)
    } else {
        Err(BlosError::InvalidDigest(value.to_string()))
    }
}

fn check_requested(sha512: &str, have: &FinalData, requested: &BTreeMap<HashKind, String>) -> Result<()> {
    for (kind, wanted) in requested {
        let Some(recorded) = have.get(*kind) else { continue };
        let wanted = wanted.trim().to_ascii_lowercase();
        if wanted != recorded {
            return Err(BlosError::HashMismatch {
                sha512: sha512.to_string(),
                kind: *kind,
                requested: wanted,
                recorded,
            });
        }
    }
    Ok(())
}
