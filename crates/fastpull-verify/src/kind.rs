use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::VerificationError;

/// A named hash algorithm, or the `size` pseudo-hash (byte count).
///
/// The declaration order is the canonical order used when hashes are listed
/// or persisted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Sha512,
    Blake2b,
    Sha256,
    Size,
}

impl HashKind {
    /// Every kind this crate can compute.
    pub const ALL: [HashKind; 4] = [
        HashKind::Sha512,
        HashKind::Blake2b,
        HashKind::Sha256,
        HashKind::Size,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Sha512 => "sha512",
            HashKind::Blake2b => "blake2b",
            HashKind::Sha256 => "sha256",
            HashKind::Size => "size",
        }
    }

    /// `false` only for [`HashKind::Size`].
    pub fn is_digest(&self) -> bool { !matches!(self, HashKind::Size) }

    /// Length of the lowercase hex encoding, `None` for `size`.
    pub fn hex_len(&self) -> Option<usize> {
        match self {
            HashKind::Sha512 | HashKind::Blake2b => Some(128),
            HashKind::Sha256 => Some(64),
            HashKind::Size => None,
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for HashKind {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha512" => Ok(HashKind::Sha512),
            "blake2b" => Ok(HashKind::Blake2b),
            "sha256" => Ok(HashKind::Sha256),
            "size" => Ok(HashKind::Size),
            other => Err(VerificationError::UnknownHashKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("SHA512".parse::<HashKind>().unwrap(), HashKind::Sha512);
        assert_eq!(" blake2b ".parse::<HashKind>().unwrap(), HashKind::Blake2b);
        assert_eq!("size".parse::<HashKind>().unwrap(), HashKind::Size);
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "md5".parse::<HashKind>().unwrap_err();
        assert!(matches!(err, VerificationError::UnknownHashKind(ref name) if name == "md5"));
    }

    #[test]
    fn display_matches_parse() {
        for kind in HashKind::ALL {
            assert_eq!(kind.to_string().parse::<HashKind>().unwrap(), kind);
        }
    }

    #[test]
    fn size_is_not_a_digest() {
        assert!(!HashKind::Size.is_digest());
        assert_eq!(HashKind::Size.hex_len(), None);
        assert_eq!(HashKind::Sha256.hex_len(), Some(64));
    }
}
