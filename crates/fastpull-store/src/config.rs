use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use fastpull_verify::HashKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What `get_object` may compute from disk when the index lacks data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillStrategy {
    /// Never touch a file the index does not know about.
    None,
    /// Compute the desired hash set.
    #[default]
    Desired,
    /// Compute every supported kind.
    All,
}

/// Object store settings.
///
/// ```
/// use fastpull_store::{BackfillStrategy, BlosConfig};
///
/// let config = BlosConfig::from_toml_str(r#"
///     root = "/var/cache/distfiles"
///     backfill = "all"
/// "#).unwrap();
/// assert_eq!(config.backfill, BackfillStrategy::All);
/// assert!(config.req_blos_hashes.is_superset(&config.req_client_hashes));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlosConfig {
    /// Top of the sharded object layout.
    pub root:              PathBuf,
    /// Metadata index location, `<root>/.index` when unset.
    #[serde(default)]
    pub index_dir:         Option<PathBuf>,
    /// Kinds every `get_object` lookup must supply.
    #[serde(default = "defaults::client")]
    pub req_client_hashes: BTreeSet<HashKind>,
    /// Kinds every stored object must carry.
    #[serde(default = "defaults::blos")]
    pub req_blos_hashes:   BTreeSet<HashKind>,
    /// Kinds computed whenever a file is hashed anyway.
    #[serde(default = "defaults::desired")]
    pub desired_hashes:    BTreeSet<HashKind>,
    /// Kinds recomputed from disk on every lookup.
    #[serde(default = "defaults::disk_verify")]
    pub disk_verify:       BTreeSet<HashKind>,
    #[serde(default)]
    pub backfill:          BackfillStrategy,
}

mod defaults {
    use std::collections::BTreeSet;

    use fastpull_verify::HashKind;

    pub(super) fn client() -> BTreeSet<HashKind> { [HashKind::Sha512].into() }

    pub(super) fn blos() -> BTreeSet<HashKind> { [HashKind::Sha512, HashKind::Size].into() }

    pub(super) fn desired() -> BTreeSet<HashKind> { HashKind::ALL.into() }

    pub(super) fn disk_verify() -> BTreeSet<HashKind> { [HashKind::Sha512, HashKind::Size].into() }
}

impl BlosConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root:              root.into(),
            index_dir:         None,
            req_client_hashes: defaults::client(),
            req_blos_hashes:   defaults::blos(),
            desired_hashes:    defaults::desired(),
            disk_verify:       defaults::disk_verify(),
            backfill:          BackfillStrategy::default(),
        }
    }

    /// Parses and normalizes a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        Ok(config.normalized())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    #[must_use]
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn backfill(mut self, backfill: BackfillStrategy) -> Self {
        self.backfill = backfill;
        self
    }

    #[must_use]
    pub fn req_client_hashes(mut self, kinds: impl IntoIterator<Item = HashKind>) -> Self {
        self.req_client_hashes = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn desired_hashes(mut self, kinds: impl IntoIterator<Item = HashKind>) -> Self {
        self.desired_hashes = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn disk_verify(mut self, kinds: impl IntoIterator<Item = HashKind>) -> Self {
        self.disk_verify = kinds.into_iter().collect();
        self
    }

    /// Enforces `sha512 ∈ client ⊆ blos ⊆ desired` and `size ∈ blos`.
    ///
    /// Objects are keyed by sha512, so it is always required.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.req_client_hashes.insert(HashKind::Sha512);
        self.req_blos_hashes.extend(self.req_client_hashes.iter().copied());
        self.req_blos_hashes.insert(HashKind::Size);
        self.desired_hashes.extend(self.req_blos_hashes.iter().copied());
        self
    }

    pub fn resolved_index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| self.root.join(".index"))
    }
}
