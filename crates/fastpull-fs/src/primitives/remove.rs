use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;

/// Removes `path`. Returns `false` when there was nothing to remove.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Write {
            path:   path.to_path_buf(),
            source: e,
        }),
    }
}

/// Walks from the parent of `path` upwards, removing empty directories, and
/// stops at `root` (never removed) or the first non-empty directory.
pub fn prune_empty_parents(path: impl AsRef<Path>, root: impl AsRef<Path>) {
    let root = root.as_ref();
    let mut current = path.as_ref().parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
