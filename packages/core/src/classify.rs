//! Disc content-type classification.
//!
//! Given a device path, the classifier determines whether the inserted
//! medium is an audio disc, a video CD, a DVD-Video disc, or plain data,
//! using only device status queries and filesystem structure.
//!
//! Probes run cheapest first: the disc-status ioctl needs no mount, so audio
//! discs are recognized without touching the filesystem at all. Mounting is
//! deferred until a probe needs directory access, and one mount session is
//! shared by all probes of the same request.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::device::resolve_device;
use crate::drive::{CdromOpener, DeviceSession, DriveOpener, MediaClass};
use crate::error::{Error, IoResultExt, Result};
use crate::fstab::{self, MountTables};
use crate::mount::{CommandMounter, Mounter, MountSession};

/// The content kind of an inserted disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscKind {
    /// Plain data disc; the fallback when no other probe matches.
    Data,
    /// Audio (or mixed-mode) disc.
    Cdda,
    /// Video CD.
    Vcd,
    /// DVD-Video disc.
    Dvd,
}

impl std::fmt::Display for DiscKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            Self::Data => "data",
            Self::Cdda => "cdda",
            Self::Vcd => "vcd",
            Self::Dvd => "dvd",
        };
        f.write_str(token)
    }
}

/// The disc content-type detection engine.
///
/// One `classify` call is one synchronous request; the classifier holds no
/// state across calls and nothing is cached. Concurrent requests against the
/// same device path can race on mount state, so callers serialize per
/// device.
pub struct Classifier {
    tables: MountTables,
    drives: Box<dyn DriveOpener>,
    mounter: Box<dyn Mounter>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            tables: MountTables::default(),
            drives: Box::new(CdromOpener),
            mounter: Box::new(CommandMounter::new()),
        }
    }
}

impl Classifier {
    /// Creates a classifier against the system tables and the real cdrom
    /// backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mount table locations.
    pub fn with_tables(mut self, tables: MountTables) -> Self {
        self.tables = tables;
        self
    }

    /// Replaces the drive backend.
    pub fn with_drive_opener(mut self, opener: impl DriveOpener + 'static) -> Self {
        self.drives = Box::new(opener);
        self
    }

    /// Replaces the mount/unmount mechanism.
    pub fn with_mounter(mut self, mounter: impl Mounter + 'static) -> Self {
        self.mounter = Box::new(mounter);
        self
    }

    /// Classifies the medium in the drive at `device_path`.
    ///
    /// Returns one of the four content kinds, or an error carrying a
    /// display-ready diagnostic. Errors are terminal: nothing is retried,
    /// and no partial classification is ever returned. The device handle
    /// and any mount performed here are released before returning, on every
    /// path.
    pub fn classify(&self, device_path: &Path) -> Result<DiscKind> {
        let identity = resolve_device(device_path)?;
        debug!(device = %identity.as_path().display(), "resolved device node");

        let binding = fstab::find_mountpoint(&self.tables, &identity)?;
        debug!(mountpoint = %binding.mountpoint.display(), "found mount binding");

        let session = DeviceSession::open(&*self.drives, &identity)?;
        session.ensure_ready()?;

        // Audio probe: raw disc status only, no mount involved.
        let status = session.media_status()?;
        debug!(%status, "disc status");
        match status.class() {
            MediaClass::Audio => return Ok(DiscKind::Cdda),
            MediaClass::Data => {}
            MediaClass::Unrecognized => {
                return Err(Error::UnrecognizedMedia {
                    device: session.device().to_path_buf(),
                    status,
                });
            }
        }

        // The structural probes share one mount session.
        let mut mount = MountSession::new(&binding, &self.tables, &*self.mounter);

        if let Some(kind) = probe_vcd(&mut mount)? {
            return Ok(kind);
        }

        if probe_dvd(&session, &mut mount)? {
            return Ok(DiscKind::Dvd);
        }

        Ok(DiscKind::Data)
    }
}

/// Video CD probe.
///
/// Mounts and opens the disc root. VCD pressings (VCD 1.1/2.0, SVCD, CVD)
/// differ enough in their on-disc layout that no structural check is wired
/// up here yet; a disc that reaches this probe falls through to the later
/// ones. Mount and directory failures are still surfaced.
fn probe_vcd(mount: &mut MountSession<'_>) -> Result<Option<DiscKind>> {
    let _dir = mount.open()?;
    Ok(None)
}

/// DVD-Video probe.
///
/// Only runs on drives whose capability bitmask carries the DVD bit; other
/// drives cannot have DVD media loaded, so no mount happens for them here.
/// The disc is DVD-Video iff its root carries a `VIDEO_TS` directory with a
/// `VIDEO_TS.IFO` file inside, plus an `AUDIO_TS` directory. Name matching
/// is exact and case-sensitive. A `VIDEO_TS` directory that is found but
/// cannot be opened is a hard failure, unlike the tolerated absence of any
/// of the three marks.
fn probe_dvd(session: &DeviceSession, mount: &mut MountSession<'_>) -> Result<bool> {
    if !session.supports_dvd() {
        return Ok(false);
    }

    let dir = mount.open()?;
    let mountpoint = mount.mountpoint().to_path_buf();

    let mut have_vts = false;
    let mut have_vts_ifo = false;
    let mut have_ats = false;

    for entry in dir {
        let entry = entry.directory_context(&mountpoint)?;
        let file_type = entry.file_type().directory_context(&mountpoint)?;
        let name = entry.file_name();

        if name == "VIDEO_TS" && file_type.is_dir() {
            have_vts = true;

            let subdir_path = mountpoint.join("VIDEO_TS");
            let subdir = fs::read_dir(&subdir_path).directory_context(&subdir_path)?;
            for sub in subdir {
                let sub = sub.directory_context(&subdir_path)?;
                if sub.file_name() == "VIDEO_TS.IFO"
                    && sub.file_type().directory_context(&subdir_path)?.is_file()
                {
                    have_vts_ifo = true;
                }
            }
        } else if name == "AUDIO_TS" && file_type.is_dir() {
            have_ats = true;
        }
    }

    Ok(have_vts && have_vts_ifo && have_ats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{
        CDC_DVD, CDS_AUDIO, CDS_DATA_1, CDS_DISC_OK, CDS_MIXED, CDS_NO_INFO, CDS_TRAY_OPEN,
        DriveIo,
    };
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::path::PathBuf;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct FakeDrive {
        caps: i32,
        drive_status: i32,
        media_status: i32,
        media_calls: Rc<Cell<usize>>,
    }

    impl DriveIo for FakeDrive {
        fn capabilities(&self) -> std::io::Result<i32> {
            Ok(self.caps)
        }

        fn drive_status(&self) -> std::io::Result<i32> {
            Ok(self.drive_status)
        }

        fn media_status(&self) -> std::io::Result<i32> {
            self.media_calls.set(self.media_calls.get() + 1);
            Ok(self.media_status)
        }
    }

    #[derive(Clone)]
    struct FakeOpener {
        caps: i32,
        drive_status: i32,
        media_status: i32,
        opens: Rc<Cell<usize>>,
        media_calls: Rc<Cell<usize>>,
    }

    impl FakeOpener {
        fn new(caps: i32, drive_status: i32, media_status: i32) -> Self {
            Self {
                caps,
                drive_status,
                media_status,
                opens: Rc::new(Cell::new(0)),
                media_calls: Rc::new(Cell::new(0)),
            }
        }
    }

    impl DriveOpener for FakeOpener {
        fn open(&self, _device: &Path) -> std::io::Result<Box<dyn DriveIo>> {
            self.opens.set(self.opens.get() + 1);
            Ok(Box::new(FakeDrive {
                caps: self.caps,
                drive_status: self.drive_status,
                media_status: self.media_status,
                media_calls: self.media_calls.clone(),
            }))
        }
    }

    #[derive(Clone)]
    struct FakeMounter {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl FakeMounter {
        fn new() -> Self {
            Self {
                calls: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl Mounter for FakeMounter {
        fn mount(&self, _mountpoint: &Path) -> Result<()> {
            self.calls.borrow_mut().push("mount".into());
            Ok(())
        }

        fn unmount(&self, _mountpoint: &Path) -> Result<()> {
            self.calls.borrow_mut().push("umount".into());
            Ok(())
        }
    }

    /// A device alias chain, an fstab binding it to a mountpoint inside the
    /// tempdir, and an mtab that is empty unless `premounted`.
    struct Scenario {
        _dir: TempDir,
        device_link: PathBuf,
        mountpoint: PathBuf,
        tables: MountTables,
    }

    fn scenario(premounted: bool) -> Scenario {
        let dir = TempDir::new().unwrap();

        // /dev/sr0 -> /dev/sr1 -> real node
        let node = dir.path().join("sr1");
        std::fs::write(&node, b"").unwrap();
        let device_link = dir.path().join("sr0");
        std::os::unix::fs::symlink(&node, &device_link).unwrap();

        let mountpoint = dir.path().join("cdrom");
        std::fs::create_dir(&mountpoint).unwrap();

        let fstab = dir.path().join("fstab");
        let mut f = std::fs::File::create(&fstab).unwrap();
        writeln!(f, "UUID=not-a-node  /  ext4  defaults  0  1").unwrap();
        writeln!(
            f,
            "{}  {}  iso9660  ro,user,noauto  0  0",
            node.display(),
            mountpoint.display()
        )
        .unwrap();

        let mtab = dir.path().join("mtab");
        let mut m = std::fs::File::create(&mtab).unwrap();
        if premounted {
            writeln!(
                m,
                "{}  {}  iso9660  ro  0  0",
                node.display(),
                mountpoint.display()
            )
            .unwrap();
        }

        let tables = MountTables::new().with_fstab(&fstab).with_mtab(&mtab);

        Scenario {
            _dir: dir,
            device_link,
            mountpoint,
            tables,
        }
    }

    fn dvd_layout(mountpoint: &Path) {
        let video_ts = mountpoint.join("VIDEO_TS");
        std::fs::create_dir(&video_ts).unwrap();
        std::fs::write(video_ts.join("VIDEO_TS.IFO"), b"").unwrap();
        std::fs::create_dir(mountpoint.join("AUDIO_TS")).unwrap();
    }

    #[test]
    fn test_missing_binding_never_opens_device() {
        let scenario = scenario(false);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);
        let opens = opener.opens.clone();

        // Point fstab at a table with no record for the device.
        let mut tables = scenario.tables.clone();
        let dir = TempDir::new().unwrap();
        let empty_fstab = dir.path().join("fstab");
        std::fs::write(&empty_fstab, "UUID=other  /  ext4  defaults  0  1\n").unwrap();
        tables.fstab = empty_fstab;

        let classifier = Classifier::new()
            .with_tables(tables)
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let err = classifier.classify(&scenario.device_link).unwrap_err();
        assert!(matches!(err, Error::MountpointNotFound { .. }));
        assert_eq!(opens.get(), 0);
    }

    #[test]
    fn test_not_ready_drive_is_terminal() {
        let scenario = scenario(false);
        let opener = FakeOpener::new(CDC_DVD, CDS_TRAY_OPEN, CDS_DATA_1);
        let media_calls = opener.media_calls.clone();
        let mounter = FakeMounter::new();
        let mounts = mounter.calls.clone();

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(mounter);

        let err = classifier.classify(&scenario.device_link).unwrap_err();
        assert!(matches!(err, Error::DriveNotReady { .. }));
        // No content probe ran.
        assert_eq!(media_calls.get(), 0);
        assert!(mounts.borrow().is_empty());
    }

    #[test]
    fn test_audio_disc_is_cdda_without_mount() {
        for status in [CDS_AUDIO, CDS_MIXED] {
            let scenario = scenario(false);
            let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, status);
            let mounter = FakeMounter::new();
            let mounts = mounter.calls.clone();

            let classifier = Classifier::new()
                .with_tables(scenario.tables.clone())
                .with_drive_opener(opener)
                .with_mounter(mounter);

            let kind = classifier.classify(&scenario.device_link).unwrap();
            assert_eq!(kind, DiscKind::Cdda);
            assert!(mounts.borrow().is_empty());
        }
    }

    #[test]
    fn test_unrecognized_media_is_error() {
        let scenario = scenario(false);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_NO_INFO);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let err = classifier.classify(&scenario.device_link).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedMedia { .. }));
    }

    #[test]
    fn test_data_disc_without_dvd_layout() {
        let scenario = scenario(false);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);
        let mounter = FakeMounter::new();
        let mounts = mounter.calls.clone();

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(mounter);

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Data);

        // One shared mount session across both structural probes.
        assert_eq!(*mounts.borrow(), vec!["mount".to_string(), "umount".into()]);
    }

    #[test]
    fn test_dvd_layout_through_symlink_chain() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Dvd);
    }

    #[test]
    fn test_dvd_layout_without_dvd_capability_is_data() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        let opener = FakeOpener::new(0, CDS_DISC_OK, CDS_DATA_1);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Data);
    }

    #[test]
    fn test_dvd_layout_missing_audio_ts_is_data() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        std::fs::remove_dir(scenario.mountpoint.join("AUDIO_TS")).unwrap();
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Data);
    }

    #[test]
    fn test_dvd_layout_missing_ifo_is_data() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        std::fs::remove_file(scenario.mountpoint.join("VIDEO_TS").join("VIDEO_TS.IFO")).unwrap();
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Data);
    }

    #[test]
    fn test_unopenable_video_ts_is_hard_error() {
        use std::os::unix::fs::PermissionsExt;

        // Root bypasses directory permission bits, so the unreadable-dir
        // setup cannot fail there.
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        let video_ts = scenario.mountpoint.join("VIDEO_TS");
        std::fs::set_permissions(&video_ts, std::fs::Permissions::from_mode(0o000)).unwrap();

        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);
        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let err = classifier.classify(&scenario.device_link).unwrap_err();
        assert!(matches!(err, Error::DirectoryOpen { .. }));

        // Restore so tempdir cleanup can remove the contents.
        std::fs::set_permissions(&video_ts, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_preexisting_mount_is_preserved() {
        let scenario = scenario(true);
        dvd_layout(&scenario.mountpoint);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);
        let mounter = FakeMounter::new();
        let mounts = mounter.calls.clone();

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(mounter);

        let kind = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(kind, DiscKind::Dvd);
        // Neither mounted nor unmounted by the engine.
        assert!(mounts.borrow().is_empty());
    }

    #[test]
    fn test_classify_is_idempotent_and_restores_mount_state() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);
        let mounter = FakeMounter::new();
        let mounts = mounter.calls.clone();

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(mounter);

        let first = classifier.classify(&scenario.device_link).unwrap();
        let second = classifier.classify(&scenario.device_link).unwrap();
        assert_eq!(first, second);

        // Each call mounted for itself and cleaned up after itself.
        assert_eq!(
            *mounts.borrow(),
            vec![
                "mount".to_string(),
                "umount".into(),
                "mount".into(),
                "umount".into(),
            ]
        );
    }

    #[test]
    fn test_direct_node_and_alias_agree() {
        let scenario = scenario(false);
        dvd_layout(&scenario.mountpoint);
        let opener = FakeOpener::new(CDC_DVD, CDS_DISC_OK, CDS_DATA_1);

        let classifier = Classifier::new()
            .with_tables(scenario.tables.clone())
            .with_drive_opener(opener)
            .with_mounter(FakeMounter::new());

        let via_alias = classifier.classify(&scenario.device_link).unwrap();
        let direct = classifier
            .classify(&scenario.device_link.parent().unwrap().join("sr1"))
            .unwrap();
        assert_eq!(via_alias, direct);
    }

    #[test]
    fn test_disc_kind_display() {
        assert_eq!(DiscKind::Data.to_string(), "data");
        assert_eq!(DiscKind::Cdda.to_string(), "cdda");
        assert_eq!(DiscKind::Vcd.to_string(), "vcd");
        assert_eq!(DiscKind::Dvd.to_string(), "dvd");
    }
}
