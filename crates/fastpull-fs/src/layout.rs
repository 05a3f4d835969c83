//! Sharded content-addressed layout.
//!
//! An object with digest `d` lives at `<root>/d[0:2]/d[2:4]/d[4:6]/d`. The
//! three shard levels bound per-directory entry counts.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, Result};

const SHARD_DEPTH: usize = 3;
const SHARD_WIDTH: usize = 2;

fn is_digest(digest: &str) -> bool {
    digest.len() >= SHARD_DEPTH * SHARD_WIDTH
        && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Path of the object named `digest` under `root`.
pub fn object_path(root: impl AsRef<Path>, digest: &str) -> Result<PathBuf> {
    if !is_digest(digest) {
        return Err(Error::InvalidDigest(digest.to_string()));
    }
    let mut path = root.as_ref().to_path_buf();
    for level in 0..SHARD_DEPTH {
        let start = level * SHARD_WIDTH;
        path.push(&digest[start..start + SHARD_WIDTH]);
    }
    path.push(digest);
    Ok(path)
}

/// Every object file under `root` whose location matches its name.
///
/// Dot-directories at the top level (the index lives in one) and stray files
/// are skipped.
pub fn walk_objects(root: impl AsRef<Path>) -> impl Iterator<Item = Result<(String, PathBuf)>> {
    let root = root.as_ref().to_path_buf();
    WalkDir::new(&root)
        .min_depth(SHARD_DEPTH + 1)
        .max_depth(SHARD_DEPTH + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    return Some(Err(Error::Read {
                        path,
                        source: e.into(),
                    }));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let name = entry.file_name().to_str()?.to_string();
            let expected = object_path(&root, &name).ok()?;
            (expected == entry.path()).then(|| Ok((name, entry.into_path())))
        })
}
