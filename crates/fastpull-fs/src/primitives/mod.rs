pub mod hardlink;
pub mod remove;

pub use hardlink::{FallbackStrategy, HardlinkOrCopyOptions, LinkOutcome, hardlink_or_copy};
pub use remove::{prune_empty_parents, remove_file_if_exists};
