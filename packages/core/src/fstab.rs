//! Mount table reading.
//!
//! Two tables share the classic six-field record shape (device spec, mount
//! directory, filesystem type, options, dump flag, fsck pass):
//!
//! - the static configuration table (`/etc/fstab`), consulted to find the
//!   mountpoint registered for a device, and
//! - the live mount-state table (`/etc/mtab`), consulted to detect mounts
//!   that already existed before a classification request.
//!
//! Records are matched by canonical device identity, so an fstab entry for
//! `/dev/cdrom` binds a request for `/dev/sr0` when both aliases resolve to
//! the same node.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::device::{DeviceIdentity, resolve_device};
use crate::error::{Error, IoResultExt, Result};

/// Default static mount-configuration table.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Default live mount-state table.
pub const MTAB_PATH: &str = "/etc/mtab";

/// Locations of the two mount tables.
///
/// Injectable so tests (and chrooted setups) can point the engine at their
/// own table files.
#[derive(Debug, Clone)]
pub struct MountTables {
    /// Static configuration table path.
    pub fstab: PathBuf,
    /// Live mount-state table path.
    pub mtab: PathBuf,
}

impl Default for MountTables {
    fn default() -> Self {
        Self {
            fstab: PathBuf::from(FSTAB_PATH),
            mtab: PathBuf::from(MTAB_PATH),
        }
    }
}

impl MountTables {
    /// Creates a table config pointing at the system defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the static configuration table path.
    pub fn with_fstab(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab = path.into();
        self
    }

    /// Sets the live mount-state table path.
    pub fn with_mtab(mut self, path: impl Into<PathBuf>) -> Self {
        self.mtab = path.into();
        self
    }
}

/// A single six-field mount table record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// The device field (e.g. "/dev/sr0", "UUID=xxx").
    pub fs_spec: String,
    /// Mount directory path.
    pub mount_dir: PathBuf,
    /// Filesystem type (e.g. "iso9660", "udf").
    pub vfs_type: String,
    /// Mount options.
    pub options: Vec<String>,
    /// Field used by dump(8).
    pub dump: u8,
    /// Field used by fsck(8) to order boot-time checks.
    pub pass: u16,
}

impl MountRecord {
    /// Parses a single table line into a record.
    ///
    /// Returns None for comments, empty lines, and lines that do not carry
    /// all six fields; table scanning is lenient because foreign entries are
    /// none of our business.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 6 {
            return None;
        }

        let dump = parts[4].parse::<u8>().ok()?;
        let pass = parts[5].parse::<u16>().ok()?;

        Some(Self {
            fs_spec: parts[0].to_string(),
            mount_dir: PathBuf::from(unescape_table_path(parts[1])),
            vfs_type: parts[2].to_string(),
            options: parts[3].split(',').map(|s| s.to_string()).collect(),
            dump,
            pass,
        })
    }
}

/// Unescapes octal sequences in mount table paths.
///
/// The kernel and mount(8) encode exactly four characters in the mount-dir
/// field: space (\040), tab (\011), newline (\012) and backslash (\134).
/// Only those sequences are decoded; anything else after a backslash is kept
/// literal, so escaped bytes outside ASCII never get misdecoded as Latin-1
/// code points.
fn unescape_table_path(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let sequence: String = chars.clone().take(3).collect();
            let decoded = match sequence.as_str() {
                "040" => Some(' '),
                "011" => Some('\t'),
                "012" => Some('\n'),
                "134" => Some('\\'),
                _ => None,
            };

            if let Some(decoded) = decoded {
                result.push(decoded);
                for _ in 0..3 {
                    chars.next();
                }
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// The static association between a device and its configured mountpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountBinding {
    /// Canonical device identity the binding was found for.
    pub device: DeviceIdentity,
    /// Mount directory registered for the device.
    pub mountpoint: PathBuf,
}

/// Iterates the records of a table file.
fn read_records(table: &Path) -> Result<Vec<MountRecord>> {
    let file = fs::File::open(table).table_context(table)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.table_context(table)?;
        if let Some(record) = MountRecord::from_line(&line) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Finds the mountpoint registered for a device in the configuration table.
///
/// Each record's device field is resolved through [`resolve_device`] and
/// compared against `device` by canonical identity; records whose field does
/// not resolve to a filesystem entry (UUID=/LABEL= specs, stale paths) are
/// skipped. The first match wins, in table order.
pub fn find_mountpoint(tables: &MountTables, device: &DeviceIdentity) -> Result<MountBinding> {
    for record in read_records(&tables.fstab)? {
        let Ok(identity) = resolve_device(Path::new(&record.fs_spec)) else {
            continue;
        };

        if identity == *device {
            return Ok(MountBinding {
                device: device.clone(),
                mountpoint: record.mount_dir,
            });
        }
    }

    Err(Error::MountpointNotFound {
        device: device.as_path().to_path_buf(),
        table: tables.fstab.clone(),
    })
}

/// Returns true if the live mount-state table carries an entry for
/// `mountpoint`.
pub fn is_mounted(tables: &MountTables, mountpoint: &Path) -> Result<bool> {
    Ok(read_records(&tables.mtab)?
        .iter()
        .any(|record| record.mount_dir == mountpoint))
}
