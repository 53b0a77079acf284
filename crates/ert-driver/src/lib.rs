//! Userspace submission and polling driver for the embedded-runtime command
//! queue.
//!
//! Commands are built with `ert-proto`, handed to a device execution slot,
//! and polled to completion. The device owns the header `state` field of
//! every in-flight command; this crate's job is the discipline around that:
//! copy-on-submit, bounded level-triggered polling, re-scan after every
//! wake-up, retire only on a terminal state.
//!
//! # Channel hierarchy
//!
//! ```text
//! Hardware:
//!   CqChannel   — mapped command queue on /dev/ertq* (mmap + doorbell + poll)
//!
//! Development / CI:
//!   SimChannel  — in-process scheduler model, no hardware required
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use ert_driver::DeviceManager;
//! use ert_proto::{ConfigureCommand, RegisterMap, StartKernelCommand};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mgr = DeviceManager::discover()?;
//! let mut dev = mgr.open_first()?;
//!
//! let cfg = ConfigureCommand::new(4096, 16, vec![0x1800_0000]);
//! dev.configure(&cfg, Duration::from_secs(1))?;
//!
//! let mut regmap = RegisterMap::new();
//! regmap.set(0x0, 0)?;
//! regmap.set_arg64(0x40, 0x4_0000_0000)?;
//! let start = StartKernelCommand::new(0x1, regmap);
//! let state = dev.start_kernel(&start, Duration::from_secs(1))?;
//! ert_driver::ensure_completed(state)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
mod channel;
mod device;
mod discovery;
mod error;
mod queue;

pub use backends::{CqChannel, SimChannel};
pub use channel::{select_channel, ChannelSelection, ChannelType, ExecChannel, PollResult, SlotIndex};
pub use device::{ErtDevice, SchedulerConfig};
pub use discovery::{DeviceInfo, DeviceManager, QueueGeometry};
pub use error::{ErtError, Result};
pub use queue::{ensure_completed, CommandQueue, Submission};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ensure_completed, ChannelSelection, CommandQueue, DeviceInfo, DeviceManager, ErtDevice,
        ErtError, ExecChannel, PollResult, QueueGeometry, Result, SimChannel, Submission,
    };
}
