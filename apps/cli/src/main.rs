//! discprobe - classify the medium in an optical drive.
//!
//! Prints one of `data`, `cdda`, `vcd`, `dvd` for the inserted disc, or the
//! failure diagnostic on stderr with a non-zero exit. A media player maps the
//! printed kind to its playback source; this front-end just exposes the
//! engine on the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use discprobe_core::{Classifier, MountTables};

/// Optical-disc content-type detection.
#[derive(Parser)]
#[command(name = "discprobe")]
#[command(about = "Detect whether an optical disc is audio, VCD, DVD or data", long_about = None)]
struct Cli {
    /// Device node to probe.
    #[arg(default_value = "/dev/cdrom")]
    device: PathBuf,

    /// Static mount-configuration table to consult.
    #[arg(long, default_value = "/etc/fstab")]
    fstab: PathBuf,

    /// Live mount-state table to consult.
    #[arg(long, default_value = "/etc/mtab")]
    mtab: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let classifier = Classifier::new()
        .with_tables(MountTables::new().with_fstab(cli.fstab).with_mtab(cli.mtab));

    match classifier.classify(&cli.device) {
        Ok(kind) => {
            println!("{kind}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
