use std::collections::BTreeMap;

use fastpull_fetch::{FetchRequest, HttpClient};
use fastpull_store::{Blos, BlosError, Object};
use fastpull_verify::{HashKind, VerificationError};
use tracing::{debug, info, warn};

use crate::error::{Result, ScopeError};
use crate::record::IntegrityRecord;

const TREE: &str = "integrity";

/// Logical-name index over a [`Blos`], stored in the store's own sled
/// database.
pub struct IntegrityDatabase<C> {
    blos: Blos<C>,
    tree: sled::Tree,
}

impl<C> IntegrityDatabase<C> {
    pub fn new(blos: Blos<C>) -> Result<Self> {
        let tree = blos.database().open_tree(TREE)?;
        Ok(Self { blos, tree })
    }

    pub fn blos(&self) -> &Blos<C> { &self.blos }

    /// Records for one (release, kit, branch). Scopes never see each other's
    /// records.
    pub fn scope(&self, release: &str, kit: &str, branch: &str) -> IntegrityScope<'_, C> {
        IntegrityScope {
            db:      self,
            release: release.to_string(),
            kit:     kit.to_string(),
            branch:  branch.to_string(),
            prefix:  DbKeys::scope_prefix(release, kit, branch),
        }
    }
}

struct DbKeys;

impl DbKeys {
    fn scope_prefix(release: &str, kit: &str, branch: &str) -> Vec<u8> {
        format!(
            "scope:{}:{}:{}:",
            hex::encode(release),
            hex::encode(kit),
            hex::encode(branch)
        )
        .into_bytes()
    }

    fn record_key(prefix: &[u8], url: &str) -> Vec<u8> {
        let mut key = prefix.to_vec();
        key.extend_from_slice(hex::encode(url).as_bytes());
        key
    }
}

/// One (release, kit, branch) view of the integrity index.
///
/// Each record maps an authoritative URL to the sha512 of the object that
/// holds its content. Records move `absent → present` through
/// [`get_file_by_url`](Self::get_file_by_url) or
/// [`insert_record`](Self::insert_record), `present → present'` through
/// [`update_record`](Self::update_record) and `present → absent` through
/// [`remove_record`](Self::remove_record). Every record holds a
/// back-reference on its object in the store.
pub struct IntegrityScope<'a, C> {
    db:      &'a IntegrityDatabase<C>,
    release: String,
    kit:     String,
    branch:  String,
    prefix:  Vec<u8>,
}

impl<C> IntegrityScope<'_, C> {
    pub fn release(&self) -> &str { &self.release }

    pub fn kit(&self) -> &str { &self.kit }

    pub fn branch(&self) -> &str { &self.branch }

    pub fn get_record(&self, url: &str) -> Result<Option<IntegrityRecord>> {
        self.db
            .tree
            .get(self.key(url))?
            .map(|bytes| IntegrityRecord::decode(&bytes))
            .transpose()
    }

    /// Every record in this scope, ordered by URL.
    pub fn records(&self) -> Result<Vec<IntegrityRecord>> {
        self.db
            .tree
            .scan_prefix(&self.prefix)
            .map(|entry| {
                let (_, bytes) = entry?;
                IntegrityRecord::decode(&bytes)
            })
            .collect()
    }

    /// Creates the record for `url`. Fails if one already exists.
    pub fn insert_record(&self, url: &str, object: &Object) -> Result<IntegrityRecord> {
        let record = IntegrityRecord::new(url, Vec::new(), object.digest());
        let swapped = self.db.tree.compare_and_swap(
            self.key(url),
            None::<&[u8]>,
            Some(record.encode()?),
        )?;
        if swapped.is_err() {
            return Err(self.update_failure(url, "a record already exists"));
        }
        self.db.blos.add_ref(object.digest(), &self.ref_name(url))?;
        debug!(url, digest = %object.digest(), "inserted integrity record");
        Ok(record)
    }

    /// Points the existing record for `url` at `object`.
    pub fn update_record(&self, url: &str, object: &Object) -> Result<IntegrityRecord> {
        let key = self.key(url);
        let Some(old_bytes) = self.db.tree.get(&key)? else {
            return Err(self.update_failure(url, "no record exists"));
        };
        let old = IntegrityRecord::decode(&old_bytes)?;
        let record = IntegrityRecord::new(url, old.mirrors.clone(), object.digest());

        let swapped =
            self.db
                .tree
                .compare_and_swap(&key, Some(&old_bytes), Some(record.encode()?))?;
        if swapped.is_err() {
            return Err(self.update_failure(url, "record changed concurrently"));
        }
        self.move_ref(url, Some(&old.sha512), &record.sha512)?;
        debug!(url, from = %old.sha512, to = %record.sha512, "updated integrity record");
        Ok(record)
    }

    /// Deletes the record for `url`. The object itself stays in the store.
    pub fn remove_record(&self, url: &str) -> Result<IntegrityRecord> {
        let Some(bytes) = self.db.tree.remove(self.key(url))? else {
            return Err(self.update_failure(url, "no record exists"));
        };
        let record = IntegrityRecord::decode(&bytes)?;
        self.db.blos.remove_ref(&record.sha512, &self.ref_name(url))?;
        debug!(url, digest = %record.sha512, "removed integrity record");
        Ok(record)
    }

    fn key(&self, url: &str) -> Vec<u8> { DbKeys::record_key(&self.prefix, url) }

    fn ref_name(&self, url: &str) -> String {
        format!("{}/{}/{}:{}", self.release, self.kit, self.branch, url)
    }

    fn update_failure(&self, url: &str, reason: &str) -> ScopeError {
        ScopeError::UpdateFailure {
            url:    url.to_string(),
            reason: reason.to_string(),
        }
    }

    fn move_ref(&self, url: &str, from: Option<&str>, to: &str) -> Result<()> {
        let name = self.ref_name(url);
        if let Some(from) = from.filter(|from| *from != to) {
            self.db.blos.remove_ref(from, &name)?;
        }
        self.db.blos.add_ref(to, &name)?;
        Ok(())
    }

    /// Writes the record for `url` whatever its previous state.
    fn record(&self, url: &str, mirrors: &[String], object: &Object) -> Result<IntegrityRecord> {
        let record = IntegrityRecord::new(url, mirrors.to_vec(), object.digest());
        let previous = self.db.tree.insert(self.key(url), record.encode()?)?;
        let previous = previous
            .map(|bytes| IntegrityRecord::decode(&bytes))
            .transpose()?;
        self.move_ref(url, previous.as_ref().map(|p| p.sha512.as_str()), &record.sha512)?;
        Ok(record)
    }
}

impl<C: HttpClient + 'static> IntegrityScope<'_, C> {
    /// Resolves `url` to a stored object.
    ///
    /// A record whose object is still intact is served without network I/O.
    /// Otherwise the file is fetched through the store and recorded. When
    /// `expected` is given, every kind it shares with the object must agree,
    /// or [`ScopeError::IntegrityError`] is returned and no record is
    /// written. A record that had to be refetched and then fails that check
    /// is removed.
    pub async fn get_file_by_url(
        &self,
        url: &str,
        mirrors: &[String],
        expected: Option<&BTreeMap<HashKind, String>>,
    ) -> Result<Object> {
        let stale = self.get_record(url)?;
        if let Some(record) = &stale {
            match self.db.blos.object(&record.sha512) {
                Ok(Some(object)) => {
                    check_expected(url, &object, expected)?;
                    debug!(url, digest = %object.digest(), "serving recorded object");
                    return Ok(object);
                }
                Ok(None) => {
                    warn!(url, digest = %record.sha512, "recorded object is gone, fetching again");
                }
                Err(BlosError::Corruption { .. }) => {
                    warn!(url, digest = %record.sha512, "recorded object was corrupt, fetching again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let request = FetchRequest::new(url).mirrors(mirrors.iter().cloned());
        let object = self.db.blos.get_url(request).await.map_err(|e| match e {
            BlosError::RetrievalFailure { url, reason } => ScopeError::RetrievalFailure { url, reason },
            other => ScopeError::Store(other),
        })?;
        if let Err(e) = check_expected(url, &object, expected) {
            if stale.is_some() {
                self.remove_record(url)?;
                warn!(url, "dropped record whose refetched content failed verification");
            }
            return Err(e);
        }

        self.record(url, mirrors, &object)?;
        info!(
            url,
            release = %self.release,
            kit = %self.kit,
            branch = %self.branch,
            digest = %object.digest(),
            "recorded distfile"
        );
        Ok(object)
    }
}

fn check_expected(
    url: &str,
    object: &Object,
    expected: Option<&BTreeMap<HashKind, String>>,
) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    object.hashes().compare(expected).map_err(|e| match e {
        VerificationError::Mismatch {
            kind,
            expected,
            actual,
        } => ScopeError::IntegrityError {
            url: url.to_string(),
            kind,
            expected,
            actual,
        },
        other => ScopeError::Verify(other),
    })
}
