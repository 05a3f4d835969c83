use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackStrategy {
    #[default]
    Copy,
    Error,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HardlinkOrCopyOptions {
    pub fallback: FallbackStrategy,
}

impl HardlinkOrCopyOptions {
    pub fn new() -> Self { Self::default() }

    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }
}

/// What [`hardlink_or_copy`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    Copied,
    /// `dest` already existed and was left untouched.
    AlreadyPresent,
}

/// Hardlinks `src` to `dest`, copying when the two live on different devices.
///
/// An existing `dest` is not an error: under content addressing it already
/// holds the same bytes. A missing `src` is reported as
/// [`Error::SourceNotFound`].
pub fn hardlink_or_copy(
    src: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: HardlinkOrCopyOptions,
) -> Result<LinkOutcome> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    if dest.exists() {
        return Ok(LinkOutcome::AlreadyPresent);
    }

    match std::fs::hard_link(src, dest) {
        Ok(()) => Ok(LinkOutcome::Linked),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(LinkOutcome::AlreadyPresent),
        Err(e) if e.kind() == ErrorKind::NotFound && !src.exists() => {
            Err(Error::SourceNotFound(src.to_path_buf()))
        }
        Err(e) if e.raw_os_error() == Some(18) || e.kind() == ErrorKind::CrossesDevices => {
            match options.fallback {
                FallbackStrategy::Copy => copy_new(src, dest),
                FallbackStrategy::Error => Err(Error::CrossDeviceHardlink),
            }
        }
        Err(e) => Err(Error::Write {
            path:   dest.to_path_buf(),
            source: e,
        }),
    }
}

// Copies through a sibling temp name and renames, so `dest` never appears
// half written.
fn copy_new(src: &Path, dest: &Path) -> Result<LinkOutcome> {
    let tmp = dest.with_extension("partial");
    if let Err(e) = std::fs::copy(src, &tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(match e.kind() {
            ErrorKind::NotFound if !src.exists() => Error::SourceNotFound(src.to_path_buf()),
            _ => Error::Write {
                path:   tmp,
                source: e,
            },
        });
    }
    std::fs::rename(&tmp, dest).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        Error::Write {
            path:   dest.to_path_buf(),
            source: e,
        }
    })?;
    Ok(LinkOutcome::Copied)
}
