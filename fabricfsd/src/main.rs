//! fabricfsd: mount daemon for fabricfs.
//!
//! Serves GPU device memory allocations as files below a mount point:
//!
//! ```bash
//! # Mount on /mnt/fabric, allocations on GPU 0
//! fabricfsd /mnt/fabric
//!
//! # Second GPU, other users allowed, verbose logging
//! fabricfsd --device 1 --allow-other -v /mnt/fabric
//! ```
//!
//! Exit codes: 0 on clean shutdown, 1 on startup failure.

mod fuse;
mod logger;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fuser::MountOption;

use fabricfs::{FabricFs, FsConfig, GpuDriver};

#[derive(Parser)]
#[command(name = "fabricfsd", version, about = "GPU device memory allocations as filesystem entries")]
struct Args {
    /// Mount point for the allocation filesystem
    mountpoint: PathBuf,

    /// GPU device ordinal to allocate on
    #[arg(short, long, default_value_t = 0)]
    device: u32,

    /// Cap on the number of entries (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_entries: usize,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount automatically when the daemon exits
    #[arg(long)]
    auto_unmount: bool,

    /// Stay in the foreground. The daemon never daemonizes, so this is
    /// the default; the flag is accepted for init-script compatibility.
    #[arg(short, long)]
    foreground: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[cfg(feature = "cuda")]
fn build_driver() -> Arc<dyn GpuDriver> {
    Arc::new(fabricfs::CudaDriver::new())
}

#[cfg(not(feature = "cuda"))]
fn build_driver() -> Arc<dyn GpuDriver> {
    log::warn!("built without the `cuda` feature; serving mock handles no process can import");
    Arc::new(fabricfs::MockDriver::new())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::install(args.verbose).context("logger installation failed")?;
    if args.foreground {
        log::debug!("foreground requested; the daemon always runs in the foreground");
    }

    let config = FsConfig::default()
        .with_device(args.device)
        .with_max_entries(args.max_entries);
    let fs = FabricFs::new(config, build_driver());
    fs.init().context("GPU driver initialization failed")?;

    let mut options = vec![
        MountOption::FSName("fabricfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }
    if args.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    log::info!("serving on {}", args.mountpoint.display());
    fuser::mount2(fuse::FabricMount::new(fs), &args.mountpoint, &options)
        .context("mount failed")?;
    Ok(())
}
