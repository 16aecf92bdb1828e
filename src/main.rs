//! `newfs` — mounts a formatted block device or disk image at a mountpoint
//! via FUSE.

mod cli;
mod vfs;

use clap::Parser;
use fuser::MountOption;
use newfs::device::FileDevice;
use newfs::Filesystem;

fn main() {
    let args = cli::Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let device = match FileDevice::open(&args.device) {
        Ok(device) => device,
        Err(e) => {
            log::error!("failed to open {}: {e}", args.device.display());
            std::process::exit(1);
        }
    };

    let fs = match Filesystem::mount(device) {
        Ok(fs) => fs,
        Err(e) => {
            log::error!("mount failed: {e}");
            std::process::exit(1);
        }
    };

    if !args.foreground {
        log::warn!("background mode isn't implemented; staying in the foreground");
    }

    let options = vec![
        MountOption::FSName("newfs".to_string()),
        MountOption::DefaultPermissions,
    ];

    log::info!(
        "mounting {} at {}",
        args.device.display(),
        args.mountpoint.display()
    );
    if let Err(e) = fuser::mount2(vfs::Vfs::new(fs), &args.mountpoint, &options) {
        log::error!("fuse session ended with an error: {e}");
        std::process::exit(1);
    }
}
