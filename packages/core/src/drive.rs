//! Drive status queries and the device session.
//!
//! The Linux cdrom layer answers three questions through ioctls on an open
//! device node: what the drive can handle (capability bitmask), whether a
//! disc is loaded and readable (drive status), and what kind of tracks the
//! disc carries (disc status). The raw status codes are mapped into tagged
//! enums here so the classification cascade can match on them exhaustively.
//!
//! The ioctls sit behind the [`DriveIo`]/[`DriveOpener`] traits; tests swap
//! in fakes while production uses [`CdromOpener`].

use std::fmt;
use std::fs;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::device::DeviceIdentity;
use crate::error::{
    CapabilitiesSnafu, DeviceOpenSnafu, DriveStatusQuerySnafu, Error, MediaStatusQuerySnafu, Result,
};

// Status codes and the capability bit, from linux/cdrom.h.
pub const CDS_NO_INFO: i32 = 0;
pub const CDS_NO_DISC: i32 = 1;
pub const CDS_TRAY_OPEN: i32 = 2;
pub const CDS_DRIVE_NOT_READY: i32 = 3;
pub const CDS_DISC_OK: i32 = 4;
pub const CDS_AUDIO: i32 = 100;
pub const CDS_DATA_1: i32 = 101;
pub const CDS_DATA_2: i32 = 102;
pub const CDS_XA_2_1: i32 = 103;
pub const CDS_XA_2_2: i32 = 104;
pub const CDS_MIXED: i32 = 105;

/// Drive can handle DVD media.
pub const CDC_DVD: i32 = 0x8000;

const CDROM_DRIVE_STATUS: u32 = 0x5326;
const CDROM_DISC_STATUS: u32 = 0x5327;
const CDROM_GET_CAPABILITY: u32 = 0x5331;

mod ioctl {
    use nix::ioctl_none_bad;

    ioctl_none_bad!(cdrom_drive_status, super::CDROM_DRIVE_STATUS);
    ioctl_none_bad!(cdrom_disc_status, super::CDROM_DISC_STATUS);
    ioctl_none_bad!(cdrom_get_capability, super::CDROM_GET_CAPABILITY);
}

/// Decoded drive-ready status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveStatus {
    NotImplemented,
    NoDisc,
    TrayOpen,
    NotReady,
    Ready,
    Unknown(i32),
}

impl DriveStatus {
    /// Maps a raw CDROM_DRIVE_STATUS code.
    pub fn from_code(code: i32) -> Self {
        match code {
            CDS_NO_INFO => Self::NotImplemented,
            CDS_NO_DISC => Self::NoDisc,
            CDS_TRAY_OPEN => Self::TrayOpen,
            CDS_DRIVE_NOT_READY => Self::NotReady,
            CDS_DISC_OK => Self::Ready,
            other => Self::Unknown(other),
        }
    }

    fn code(&self) -> i32 {
        match self {
            Self::NotImplemented => CDS_NO_INFO,
            Self::NoDisc => CDS_NO_DISC,
            Self::TrayOpen => CDS_TRAY_OPEN,
            Self::NotReady => CDS_DRIVE_NOT_READY,
            Self::Ready => CDS_DISC_OK,
            Self::Unknown(code) => *code,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::NotImplemented => "Not implemented",
            Self::NoDisc => "No disc in tray",
            Self::TrayOpen => "Tray open",
            Self::NotReady => "Drive not ready",
            Self::Ready => "OK",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} ({})", self.code(), self.label())
    }
}

/// Decoded disc-content status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    NoInfo,
    NoDisc,
    Audio,
    DataMode1,
    DataMode2,
    XaForm1,
    XaForm2,
    Mixed,
    Unknown(i32),
}

/// What a disc-content status means to the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    /// Audio-only or mixed-mode disc.
    Audio,
    /// A recognized data or XA format; structural probes decide further.
    Data,
    /// No usable information; terminal for the request.
    Unrecognized,
}

impl MediaStatus {
    /// Maps a raw CDROM_DISC_STATUS code.
    pub fn from_code(code: i32) -> Self {
        match code {
            CDS_NO_INFO => Self::NoInfo,
            CDS_NO_DISC => Self::NoDisc,
            CDS_AUDIO => Self::Audio,
            CDS_DATA_1 => Self::DataMode1,
            CDS_DATA_2 => Self::DataMode2,
            CDS_XA_2_1 => Self::XaForm1,
            CDS_XA_2_2 => Self::XaForm2,
            CDS_MIXED => Self::Mixed,
            other => Self::Unknown(other),
        }
    }

    /// The mapping table from status to cascade outcome.
    pub fn class(&self) -> MediaClass {
        match self {
            Self::Audio | Self::Mixed => MediaClass::Audio,
            Self::DataMode1 | Self::DataMode2 | Self::XaForm1 | Self::XaForm2 => MediaClass::Data,
            Self::NoInfo | Self::NoDisc | Self::Unknown(_) => MediaClass::Unrecognized,
        }
    }

    fn code(&self) -> i32 {
        match self {
            Self::NoInfo => CDS_NO_INFO,
            Self::NoDisc => CDS_NO_DISC,
            Self::Audio => CDS_AUDIO,
            Self::DataMode1 => CDS_DATA_1,
            Self::DataMode2 => CDS_DATA_2,
            Self::XaForm1 => CDS_XA_2_1,
            Self::XaForm2 => CDS_XA_2_2,
            Self::Mixed => CDS_MIXED,
            Self::Unknown(code) => *code,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::NoInfo => "Not implemented",
            Self::NoDisc => "No disc in tray",
            Self::Audio => "Audio",
            Self::DataMode1 => "Data mode 1",
            Self::DataMode2 => "Data mode 2",
            Self::XaForm1 => "XA mode 2 form 1",
            Self::XaForm2 => "XA mode 2 form 2",
            Self::Mixed => "Mixed",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} ({})", self.code(), self.label())
    }
}

/// Capability bitmask reported by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveCapabilities(i32);

impl DriveCapabilities {
    /// Wraps a raw CDROM_GET_CAPABILITY bitmask.
    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// Returns true if the drive reports DVD support.
    pub fn supports_dvd(&self) -> bool {
        self.0 & CDC_DVD != 0
    }
}

/// Raw status queries against an open drive.
///
/// Methods return the untranslated kernel status codes; decoding happens in
/// [`DeviceSession`].
pub trait DriveIo {
    fn capabilities(&self) -> io::Result<i32>;
    fn drive_status(&self) -> io::Result<i32>;
    fn media_status(&self) -> io::Result<i32>;
}

/// Opens a device node for status queries.
pub trait DriveOpener {
    fn open(&self, device: &Path) -> io::Result<Box<dyn DriveIo>>;
}

/// The real cdrom backend: an open file descriptor plus the three ioctls.
struct CdromDrive {
    file: fs::File,
}

impl CdromDrive {
    fn ioctl(&self, op: unsafe fn(i32) -> nix::Result<i32>) -> io::Result<i32> {
        // Safety: the fd is owned by self.file and stays open for the call.
        unsafe { op(self.file.as_raw_fd()) }.map_err(io::Error::from)
    }
}

impl DriveIo for CdromDrive {
    fn capabilities(&self) -> io::Result<i32> {
        self.ioctl(ioctl::cdrom_get_capability)
    }

    fn drive_status(&self) -> io::Result<i32> {
        self.ioctl(ioctl::cdrom_drive_status)
    }

    fn media_status(&self) -> io::Result<i32> {
        self.ioctl(ioctl::cdrom_disc_status)
    }
}

/// Opens cdrom device nodes read-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdromOpener;

impl DriveOpener for CdromOpener {
    fn open(&self, device: &Path) -> io::Result<Box<dyn DriveIo>> {
        // O_NONBLOCK lets the node open even with an empty tray, so drive
        // status can still be reported.
        let file = fs::OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(device)?;
        Ok(Box::new(CdromDrive { file }))
    }
}

/// A scoped open device handle with its capability bitmask.
///
/// The handle is opened exactly once and the capabilities are fetched at
/// open; a failed capability query closes the handle and fails the open.
/// Dropping the session closes the handle.
pub struct DeviceSession {
    device: PathBuf,
    io: Box<dyn DriveIo>,
    caps: DriveCapabilities,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device", &self.device)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Opens the device and fetches its capability bitmask.
    pub fn open(opener: &dyn DriveOpener, device: &DeviceIdentity) -> Result<Self> {
        let io = opener
            .open(device.as_path())
            .context(DeviceOpenSnafu {
                device: device.as_path(),
            })?;

        // Handle is dropped (closed) if the query fails.
        let bits = io.capabilities().context(CapabilitiesSnafu {
            device: device.as_path(),
        })?;

        Ok(Self {
            device: device.as_path().to_path_buf(),
            io,
            caps: DriveCapabilities::from_bits(bits),
        })
    }

    /// Fails unless the drive reports a loaded, readable disc.
    ///
    /// Any non-ready status is a terminal error for the whole request, never
    /// a "data disc" answer.
    pub fn ensure_ready(&self) -> Result<()> {
        let code = self.io.drive_status().context(DriveStatusQuerySnafu {
            device: &self.device,
        })?;

        match DriveStatus::from_code(code) {
            DriveStatus::Ready => Ok(()),
            status => Err(Error::DriveNotReady {
                device: self.device.clone(),
                status,
            }),
        }
    }

    /// Queries the disc-content status.
    pub fn media_status(&self) -> Result<MediaStatus> {
        let code = self.io.media_status().context(MediaStatusQuerySnafu {
            device: &self.device,
        })?;
        Ok(MediaStatus::from_code(code))
    }

    /// Returns true if the capability bitmask carries the DVD bit.
    pub fn supports_dvd(&self) -> bool {
        self.caps.supports_dvd()
    }

    /// The canonical device path this session is open on.
    pub fn device(&self) -> &Path {
        &self.device
    }
}
