//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Mounts a newfs-formatted device at a mountpoint via FUSE.
#[derive(Parser, Debug)]
#[command(name = "newfs", version, about)]
pub struct Args {
    /// Path to the backing block device or flat disk image.
    #[arg(short = 'd', long = "device")]
    pub device: PathBuf,

    /// Directory to mount the filesystem at.
    pub mountpoint: PathBuf,

    /// Stay in the foreground instead of daemonizing.
    #[arg(short = 'f', long = "foreground")]
    pub foreground: bool,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
