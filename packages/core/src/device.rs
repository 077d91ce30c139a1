//! Device node resolution.
//!
//! Optical drives are almost always reached through symlinks (`/dev/cdrom ->
//! sr0`, `/dev/dvd -> sr0`), and fstab records may point at yet another alias
//! of the same node. Everything downstream compares devices by their
//! canonical path, so resolution happens exactly once per classification
//! request and the result is carried around as a [`DeviceIdentity`].

use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::error::{Error, ReadLinkSnafu, ResolveDeviceSnafu, Result};

/// Maximum number of symlink hops followed before giving up.
///
/// Matches the kernel's ELOOP limit; a chain deeper than this is treated as
/// cyclic.
const MAX_SYMLINK_DEPTH: usize = 40;

/// The canonical, symlink-resolved path of a device node.
///
/// Immutable once computed. Two aliases of the same node compare equal after
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(PathBuf);

impl DeviceIdentity {
    /// Returns the canonical path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for DeviceIdentity {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Resolves a possibly-symlinked device path to its canonical form.
///
/// Follows the chain link by link with `lstat`/`readlink` semantics rather
/// than canonicalizing the whole path: the device alias itself is what needs
/// unwrapping, and intermediate directories are left alone. Relative link
/// targets (udev writes `/dev/cdrom -> sr0`) are joined to the link's parent
/// directory.
///
/// Fails if any entry on the chain cannot be inspected or read, or if the
/// chain exceeds [`MAX_SYMLINK_DEPTH`] hops.
pub fn resolve_device(path: &Path) -> Result<DeviceIdentity> {
    let mut current = path.to_path_buf();

    for _ in 0..MAX_SYMLINK_DEPTH {
        let meta = std::fs::symlink_metadata(&current).context(ResolveDeviceSnafu {
            path: current.clone(),
        })?;

        if !meta.file_type().is_symlink() {
            return Ok(DeviceIdentity(current));
        }

        let target = std::fs::read_link(&current).context(ReadLinkSnafu {
            path: current.clone(),
        })?;

        current = if target.is_absolute() {
            target
        } else {
            match current.parent() {
                Some(parent) => parent.join(target),
                None => target,
            }
        };
    }

    Err(Error::SymlinkLoop {
        path: path.to_path_buf(),
    })
}
