//! Filesystem primitives for the content-addressed object store.

mod error;
pub mod layout;
pub mod primitives;

pub use error::{Error, Result};
pub use layout::{object_path, walk_objects};
pub use primitives::{
    FallbackStrategy, HardlinkOrCopyOptions, LinkOutcome, hardlink_or_copy, prune_empty_parents,
    remove_file_if_exists,
};

use std::path::Path;

/// Places `src` at the layout location for `digest`, creating shard
/// directories as needed.
pub fn link_object(
    root: impl AsRef<Path>,
    digest: &str,
    src: impl AsRef<Path>,
    options: HardlinkOrCopyOptions,
) -> Result<LinkOutcome> {
    let dest = object_path(root, digest)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Write {
            path:   parent.to_path_buf(),
            source: e,
        })?;
    }
    hardlink_or_copy(src, &dest, options)
}
