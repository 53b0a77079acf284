//! `ertctl` — command-line interface for embedded-runtime command queues.
//!
//! ```text
//! USAGE:
//!   ertctl enumerate                 List all devices and queue geometry
//!   ertctl info <device>             Detailed info for one device
//!   ertctl selftest [--lag N]        Configure + start against the
//!                                    software scheduler
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use ert_driver::{DeviceInfo, DeviceManager, ErtDevice, QueueGeometry, SimChannel};
use ert_proto::{CmdState, ConfigureCommand, Features, RegisterMap, StartKernelCommand};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ertctl", about = "Embedded-runtime command queue CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all command-queue devices and their geometry.
    Enumerate,
    /// Print detailed information for one device.
    Info {
        /// Node path (/dev/ertq0), device index (0), or PCIe address.
        device: String,
    },
    /// Run the configure + start-kernel sequence against the software
    /// scheduler and report per-command states and timing.
    Selftest {
        /// Delay completions by N polls, exercising the re-scan path.
        #[arg(long, default_value_t = 0)]
        lag: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Enumerate => cmd_enumerate()?,
        Cmd::Info { device } => cmd_info(&device)?,
        Cmd::Selftest { lag } => cmd_selftest(lag)?,
    }

    Ok(())
}

fn cmd_enumerate() -> Result<()> {
    let mgr = DeviceManager::discover()?;

    println!("command-queue devices: {}", mgr.device_count());
    println!();

    for info in mgr.devices() {
        println!(
            "  {} {} @ {}  ({} slots x {} B, align {})",
            info.index,
            info.path.display(),
            info.pcie_address.as_deref().unwrap_or("platform bus"),
            info.geometry.slot_count,
            info.geometry.slot_size,
            info.geometry.min_alignment,
        );
    }

    Ok(())
}

fn cmd_info(device: &str) -> Result<()> {
    let mgr = DeviceManager::discover()?;
    let info = mgr.resolve(device)?;

    println!("device {}", info.index);
    println!("  node:          {}", info.path.display());
    println!(
        "  pcie:          {}",
        info.pcie_address.as_deref().unwrap_or("platform bus")
    );
    println!("  slots:         {}", info.geometry.slot_count);
    println!("  slot size:     {} B", info.geometry.slot_size);
    println!("  min alignment: {} B", info.geometry.min_alignment);

    Ok(())
}

fn cmd_selftest(lag: u64) -> Result<()> {
    const TIMEOUT: Duration = Duration::from_secs(5);

    println!("selftest against software scheduler (completion lag {lag})");

    let channel = SimChannel::new(8, 4096).with_completion_lag(lag);
    let info = DeviceInfo::simulated(QueueGeometry::default());
    let mut dev = ErtDevice::with_channel(info, Box::new(channel));

    let cfg = ConfigureCommand::new(1024, 16, vec![0x1800_0000]).with_features(Features {
        ert: true,
        cu_dma: true,
        cu_isr: true,
        ..Features::default()
    });

    let t = Instant::now();
    let state = dev.configure(&cfg, TIMEOUT)?;
    report("configure", state, t.elapsed())?;

    let mut regmap = RegisterMap::new();
    regmap.set(0x0, 0)?;
    regmap.set_arg64(0x40, 0x0000_bbbb_aaaa_0000)?;
    let start = StartKernelCommand::new(0x1, regmap);

    let t = Instant::now();
    let state = dev.start_kernel(&start, TIMEOUT)?;
    report("start-kernel", state, t.elapsed())?;

    println!("selftest passed");
    Ok(())
}

fn report(name: &str, state: CmdState, elapsed: Duration) -> Result<()> {
    println!("  {name:<12} {state}  ({elapsed:?})");
    ert_driver::ensure_completed(state)?;
    Ok(())
}
