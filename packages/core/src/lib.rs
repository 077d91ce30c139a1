//! discprobe-core: optical-disc content-type detection.
//!
//! Given a device node, this library determines whether the inserted medium
//! is a playable audio disc (CDDA), a video CD, a DVD-Video disc, or plain
//! data, with no prior knowledge of the medium. Detection coordinates three
//! resource domains: resolving device aliases to a canonical node, locating
//! and conditionally mounting the backing filesystem, and privileged drive
//! status queries.
//!
//! # Modules
//!
//! - [`device`]: Symlink-chain resolution to a canonical device identity
//! - [`fstab`]: Mount-configuration and live mount-state table reading
//! - [`drive`]: Drive/disc status queries over an open device handle
//! - [`mount`]: Scoped mount sessions with conditional unmount on release
//! - [`classify`]: The probe cascade producing the final classification
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use discprobe_core::classify::Classifier;
//!
//! let classifier = Classifier::new();
//! match classifier.classify(Path::new("/dev/cdrom")) {
//!     Ok(kind) => println!("{kind}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

pub mod classify;
pub mod device;
pub mod drive;
pub mod error;
pub mod fstab;
pub mod mount;

// Re-export commonly used types
pub use classify::{Classifier, DiscKind};
pub use device::{DeviceIdentity, resolve_device};
pub use error::{Error, Result};
pub use fstab::{MountBinding, MountTables};
