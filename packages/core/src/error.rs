//! Unified error types for the discprobe-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.
//!
//! Every variant maps to one failure class of the classification engine:
//! device resolution, mount-table lookup, device/drive queries, and mount
//! handling. The `Display` output of an error is the diagnostic shown to the
//! user, so the strings carry the offending path or status.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

use crate::drive::{DriveStatus, MediaStatus};

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A filesystem entry on the symlink chain could not be inspected.
    #[snafu(display("failed to find real device node for {}: {source}", path.display()))]
    ResolveDevice {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A symbolic link on the chain could not be read.
    #[snafu(display("failed to read symbolic link {}: {source}", path.display()))]
    ReadLink {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Symlink resolution exceeded the depth cap.
    #[snafu(display("too many levels of symbolic links resolving {}", path.display()))]
    SymlinkLoop { path: PathBuf },

    /// A mount table (fstab or mtab) could not be opened or read.
    #[snafu(display("opening {} failed: {source}", table.display()))]
    TableRead {
        table: PathBuf,
        source: std::io::Error,
    },

    /// No fstab record resolves to the requested device.
    #[snafu(display("failed to find mountpoint for device {} in {}", device.display(), table.display()))]
    MountpointNotFound { device: PathBuf, table: PathBuf },

    /// The device node could not be opened read-only.
    #[snafu(display("failed to open device {} for reading: {source}", device.display()))]
    DeviceOpen {
        device: PathBuf,
        source: std::io::Error,
    },

    /// The capability ioctl failed after the device was opened.
    #[snafu(display("failed to retrieve capabilities of device {}: {source}", device.display()))]
    Capabilities {
        device: PathBuf,
        source: std::io::Error,
    },

    /// The drive-status ioctl itself failed.
    #[snafu(display("error getting {} drive status: {source}", device.display()))]
    DriveStatusQuery {
        device: PathBuf,
        source: std::io::Error,
    },

    /// The drive reported anything other than "disc ok".
    #[snafu(display("drive status {status} on {} - check disc", device.display()))]
    DriveNotReady {
        device: PathBuf,
        status: DriveStatus,
    },

    /// The disc-status ioctl failed.
    #[snafu(display("error getting {} disc status: {source}", device.display()))]
    MediaStatusQuery {
        device: PathBuf,
        source: std::io::Error,
    },

    /// The disc-status ioctl returned a code no probe understands.
    #[snafu(display("unexpected/unknown cd type {status} in {}", device.display()))]
    UnrecognizedMedia {
        device: PathBuf,
        status: MediaStatus,
    },

    /// The mount/umount command could not be spawned.
    #[snafu(display("failed to execute command '{command}': {source}"))]
    MountCommand {
        command: String,
        source: std::io::Error,
    },

    /// The mount command ran but exited non-zero.
    #[snafu(display("unexpected error status {code} while mounting {}: {stderr}", mountpoint.display()))]
    MountExit {
        mountpoint: PathBuf,
        code: i32,
        stderr: String,
    },

    /// A mounted directory (or one of its children) could not be opened.
    #[snafu(display("failed to open directory {}: {source}", path.display()))]
    DirectoryOpen {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for mount-table read errors.
    fn table_context(self, table: impl Into<PathBuf>) -> Result<T>;

    /// Add context for directory open/iteration errors.
    fn directory_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for command spawn errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn table_context(self, table: impl Into<PathBuf>) -> Result<T> {
        self.context(TableReadSnafu {
            table: table.into(),
        })
    }

    fn directory_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(DirectoryOpenSnafu { path: path.into() })
    }

    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(MountCommandSnafu {
            command: command.into(),
        })
    }
}
