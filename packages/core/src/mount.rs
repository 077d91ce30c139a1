//! Mount session handling.
//!
//! A [`MountSession`] makes one mountpoint accessible for the duration of a
//! single classification request. It mounts on demand, remembers whether the
//! mount was its own doing, and undoes only its own work on release: a
//! mountpoint that was already mounted before the request stays mounted
//! afterwards.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::fstab::{self, MountBinding, MountTables};

/// External mount/unmount invocation, by mountpoint path.
///
/// The single-argument form delegates device and filesystem selection to the
/// fstab entry for the mountpoint, which is exactly the entry the binding was
/// discovered from.
pub trait Mounter {
    fn mount(&self, mountpoint: &Path) -> Result<()>;
    fn unmount(&self, mountpoint: &Path) -> Result<()>;
}

/// Mounter shelling out to mount(8)/umount(8).
#[derive(Debug, Clone)]
pub struct CommandMounter {
    mount_program: String,
    umount_program: String,
}

impl Default for CommandMounter {
    fn default() -> Self {
        Self::with_programs("mount", "umount")
    }
}

impl CommandMounter {
    /// Creates a mounter using the system mount/umount commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mounter invoking the given programs instead of
    /// mount/umount.
    pub fn with_programs(mount: impl Into<String>, umount: impl Into<String>) -> Self {
        Self {
            mount_program: mount.into(),
            umount_program: umount.into(),
        }
    }

    fn run(&self, program: &str, mountpoint: &Path) -> Result<()> {
        let output = Command::new(program)
            .arg(mountpoint)
            .output()
            .command_context(program)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Error::MountExit {
                mountpoint: mountpoint.to_path_buf(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }
}

impl Mounter for CommandMounter {
    fn mount(&self, mountpoint: &Path) -> Result<()> {
        self.run(&self.mount_program, mountpoint)
    }

    fn unmount(&self, mountpoint: &Path) -> Result<()> {
        self.run(&self.umount_program, mountpoint)
    }
}

/// A scoped "this mountpoint is accessible" resource.
///
/// Created lazily on the first probe that needs directory access, reused by
/// later probes in the same request, and released when the request completes
/// regardless of outcome.
pub struct MountSession<'a> {
    binding: &'a MountBinding,
    tables: &'a MountTables,
    mounter: &'a dyn Mounter,
    mounted: bool,
    self_mounted: bool,
}

impl<'a> MountSession<'a> {
    /// Creates a closed session for the binding. Nothing is mounted yet.
    pub fn new(binding: &'a MountBinding, tables: &'a MountTables, mounter: &'a dyn Mounter) -> Self {
        Self {
            binding,
            tables,
            mounter,
            mounted: false,
            self_mounted: false,
        }
    }

    /// Makes the mountpoint accessible and returns a directory listing on it.
    ///
    /// Idempotent within the session: a second call returns a fresh listing
    /// without touching mount state. The first call checks the live mount
    /// table; a pre-existing mount is used as-is, otherwise the external
    /// mount command is invoked. Either way the directory must then open, or
    /// the whole operation fails (transient races are surfaced, not retried).
    pub fn open(&mut self) -> Result<fs::ReadDir> {
        let mountpoint = &self.binding.mountpoint;

        if !self.mounted {
            if fstab::is_mounted(self.tables, mountpoint)? {
                self.self_mounted = false;
                debug!(mountpoint = %mountpoint.display(), "mountpoint already mounted");
            } else {
                self.self_mounted = true;
                self.mounter.mount(mountpoint)?;
                debug!(mountpoint = %mountpoint.display(), "mounted");
            }
            self.mounted = true;
        }

        fs::read_dir(mountpoint).directory_context(mountpoint)
    }

    /// The mountpoint this session manages.
    pub fn mountpoint(&self) -> &Path {
        &self.binding.mountpoint
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        // Only undo a mount that was ours. Cleanup is best-effort; the
        // request already has its answer by the time this runs.
        if self.self_mounted && self.mounted {
            if let Err(e) = self.mounter.unmount(&self.binding.mountpoint) {
                warn!(
                    mountpoint = %self.binding.mountpoint.display(),
                    error = %e,
                    "unmount on release failed"
                );
            }
        }
    }
}
