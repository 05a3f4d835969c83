use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hasher::{Blake2bHasher, Hasher, Sha256Hasher, Sha512Hasher};
use crate::{HashKind, Result, VerificationError, VerifiedReader};

/// Read size used when hashing files and readers.
pub const CHUNK_SIZE: usize = 256 * 1024;

enum Accumulator {
    Sha512(Sha512Hasher),
    Blake2b(Blake2bHasher),
    Sha256(Sha256Hasher),
}

impl Accumulator {
    fn new(kind: HashKind) -> Option<Self> {
        match kind {
            HashKind::Sha512 => Some(Self::Sha512(Sha512Hasher::new())),
            HashKind::Blake2b => Some(Self::Blake2b(Blake2bHasher::new())),
            HashKind::Sha256 => Some(Self::Sha256(Sha256Hasher::new())),
            HashKind::Size => None,
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha512(h) => h.update(data),
            Self::Blake2b(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha512(h) => h.finalize(),
            Self::Blake2b(h) => h.finalize(),
            Self::Sha256(h) => h.finalize(),
        }
    }
}

/// Feeds one byte stream into several hash accumulators at once.
///
/// The byte count is always tracked, so `size` is available in the result
/// whether or not it was requested.
pub struct MultiHasher {
    accumulators: Vec<(HashKind, Accumulator)>,
    size:         u64,
}

impl MultiHasher {
    pub fn new<'a>(kinds: impl IntoIterator<Item = &'a HashKind>) -> Self {
        let wanted: BTreeSet<HashKind> = kinds.into_iter().copied().collect();
        let accumulators = wanted
            .into_iter()
            .filter_map(|kind| Accumulator::new(kind).map(|acc| (kind, acc)))
            .collect();
        Self {
            accumulators,
            size: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, acc) in &mut self.accumulators {
            acc.update(data);
        }
        self.size += data.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 { self.size }

    pub fn finalize(self) -> FinalData {
        let digests = self
            .accumulators
            .into_iter()
            .map(|(kind, acc)| (kind, hex::encode(acc.finalize())))
            .collect();
        FinalData {
            digests,
            size: self.size,
        }
    }
}

/// Result of hashing one payload: hex digests per algorithm plus byte size.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinalData {
    digests: BTreeMap<HashKind, String>,
    size:    u64,
}

impl FinalData {
    pub fn new(size: u64) -> Self {
        Self {
            digests: BTreeMap::new(),
            size,
        }
    }

    /// Adds a digest. Hex is lowercased; a `size` entry is ignored since the
    /// size is fixed at construction.
    #[must_use]
    pub fn with_digest(mut self, kind: HashKind, hex: impl AsRef<str>) -> Self {
        if kind.is_digest() {
            self.digests.insert(kind, normalize(hex.as_ref()));
        }
        self
    }

    pub fn size(&self) -> u64 { self.size }

    pub fn digest(&self, kind: HashKind) -> Option<&str> {
        self.digests.get(&kind).map(String::as_str)
    }

    pub fn sha512(&self) -> Option<&str> { self.digest(HashKind::Sha512) }

    /// Value for `kind` in its string form; `size` renders as decimal.
    pub fn get(&self, kind: HashKind) -> Option<String> {
        match kind {
            HashKind::Size => Some(self.size.to_string()),
            _ => self.digests.get(&kind).cloned(),
        }
    }

    pub fn contains(&self, kind: HashKind) -> bool {
        kind == HashKind::Size || self.digests.contains_key(&kind)
    }

    /// Every kind with a value, `size` included.
    pub fn kinds(&self) -> BTreeSet<HashKind> {
        self.digests
            .keys()
            .copied()
            .chain(std::iter::once(HashKind::Size))
            .collect()
    }

    pub fn digests(&self) -> &BTreeMap<HashKind, String> { &self.digests }

    /// Kinds in `wanted` this value does not carry.
    pub fn missing<'a>(&self, wanted: impl IntoIterator<Item = &'a HashKind>) -> BTreeSet<HashKind> {
        wanted
            .into_iter()
            .copied()
            .filter(|kind| !self.contains(*kind))
            .collect()
    }

    /// Takes digests from `other` that this value lacks. Existing values win.
    pub fn merge(&mut self, other: &FinalData) {
        for (kind, hex) in &other.digests {
            self.digests.entry(*kind).or_insert_with(|| hex.clone());
        }
    }

    /// Checks `expected` against this value.
    ///
    /// Only kinds present on both sides are compared; kinds this value never
    /// computed are skipped. The first disagreement is returned.
    pub fn compare(&self, expected: &BTreeMap<HashKind, String>) -> Result<()> {
        for (kind, want) in expected {
            let Some(actual) = self.get(*kind) else { continue };
            let want = normalize(want);
            if want != actual {
                return Err(VerificationError::Mismatch {
                    kind: *kind,
                    expected: want,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// String-keyed view, `size` included.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.kinds()
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|v| (kind.to_string(), v)))
            .collect()
    }
}

pub(crate) fn normalize(value: &str) -> String { value.trim().to_ascii_lowercase() }

/// Hashes everything `reader` yields.
pub fn hash_reader<'a, R: Read>(
    reader: R,
    kinds: impl IntoIterator<Item = &'a HashKind>,
) -> io::Result<FinalData> {
    let mut verified = VerifiedReader::new(reader, MultiHasher::new(kinds));
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        match verified.read(&mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(verified.finish())
}

pub fn hash_file<'a>(
    path: impl AsRef<Path>,
    kinds: impl IntoIterator<Item = &'a HashKind>,
) -> Result<FinalData> {
    let file = File::open(path.as_ref())?;
    Ok(hash_reader(file, kinds)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn kinds(list: &[HashKind]) -> BTreeSet<HashKind> { list.iter().copied().collect() }

    #[test]
    fn computes_only_requested_kinds() {
        let data = hash_reader(Cursor::new(b"hello world"), &kinds(&[HashKind::Sha256])).unwrap();
        assert_eq!(data.digest(HashKind::Sha256), Some(HELLO_SHA256));
        assert_eq!(data.digest(HashKind::Sha512), None);
        assert_eq!(data.size(), 11);
    }

    #[test]
    fn zero_bytes_is_a_valid_payload() {
        let data = hash_reader(Cursor::new(b""), &HashKind::ALL).unwrap();
        assert_eq!(data.sha512(), Some(EMPTY_SHA512));
        assert_eq!(data.get(HashKind::Size).as_deref(), Some("0"));
    }

    #[test]
    fn chunked_feeding_matches_single_update() {
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut chunked = MultiHasher::new(&HashKind::ALL);
        for chunk in payload.chunks(4096) {
            chunked.update(chunk);
        }
        let mut whole = MultiHasher::new(&HashKind::ALL);
        whole.update(&payload);
        assert_eq!(chunked.finalize(), whole.finalize());
    }

    #[test]
    fn compare_skips_kinds_not_computed() {
        let data = FinalData::new(11).with_digest(HashKind::Sha256, HELLO_SHA256);
        let mut expected = BTreeMap::new();
        expected.insert(HashKind::Blake2b, "00".to_string());
        expected.insert(HashKind::Sha256, HELLO_SHA256.to_uppercase());
        assert!(data.compare(&expected).is_ok());
    }

    #[test]
    fn compare_reports_both_values() {
        let data = FinalData::new(11).with_digest(HashKind::Sha256, HELLO_SHA256);
        let mut expected = BTreeMap::new();
        expected.insert(HashKind::Size, "12".to_string());
        match data.compare(&expected) {
            Err(VerificationError::Mismatch {
                kind,
                expected,
                actual,
            }) => {
                assert_eq!(kind, HashKind::Size);
                assert_eq!(expected, "12");
                assert_eq!(actual, "11");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn merge_keeps_existing_values() {
        let mut a = FinalData::new(3).with_digest(HashKind::Sha256, "aa");
        let b = FinalData::new(3)
            .with_digest(HashKind::Sha256, "bb")
            .with_digest(HashKind::Blake2b, "cc");
        a.merge(&b);
        assert_eq!(a.digest(HashKind::Sha256), Some("aa"));
        assert_eq!(a.digest(HashKind::Blake2b), Some("cc"));
    }

    #[test]
    fn missing_lists_absent_kinds() {
        let data = FinalData::new(1).with_digest(HashKind::Sha512, "ab");
        let missing = data.missing(&HashKind::ALL);
        assert_eq!(missing, kinds(&[HashKind::Blake2b, HashKind::Sha256]));
    }

    #[test]
    fn hash_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        std::fs::write(&path, b"hello world").unwrap();
        let data = hash_file(&path, &kinds(&[HashKind::Sha256, HashKind::Size])).unwrap();
        assert_eq!(data.digest(HashKind::Sha256), Some(HELLO_SHA256));
        assert_eq!(data.to_map().get("size").map(String::as_str), Some("11"));
    }

    #[test]
    fn hash_file_missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(dir.path().join("nope"), &HashKind::ALL).unwrap_err();
        assert!(matches!(err, VerificationError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }
}
