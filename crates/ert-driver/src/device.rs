//! Device session: configure once, then start kernels
//!
//! [`ErtDevice`] ties a discovered device to a [`CommandQueue`] and drives
//! the serial configure-then-start flow. The concurrent path — several
//! commands in flight against disjoint CUs — goes through
//! [`ErtDevice::queue`] directly.

use crate::backends::cq::CqChannel;
use crate::channel::ExecChannel;
use crate::discovery::DeviceInfo;
use crate::error::{ErtError, Result};
use crate::queue::CommandQueue;
use ert_proto::{cu, CmdState, ConfigureCommand, EncodingError, StartKernelCommand};
use std::time::Duration;

/// CU table recorded from a completed configure command.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Configured slot size in bytes.
    pub slot_size: u32,
    /// Shift converting a CU index to its address granularity.
    pub cu_shift: u32,
    /// AXI-Lite base address of every CU, in CU-index order.
    pub cu_base_addrs: Vec<u32>,
}

impl SchedulerConfig {
    /// Number of configured CUs.
    pub fn num_cus(&self) -> u32 {
        u32::try_from(self.cu_base_addrs.len()).unwrap_or(u32::MAX)
    }
}

/// An open session against one device's execution queue.
#[derive(Debug)]
pub struct ErtDevice {
    info: DeviceInfo,
    queue: CommandQueue<Box<dyn ExecChannel>>,
    config: Option<SchedulerConfig>,
}

impl ErtDevice {
    /// Open the hardware queue of a discovered device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device's command queue cannot be opened.
    pub fn open(info: &DeviceInfo) -> Result<Self> {
        tracing::debug!("opening device {}: {}", info.index, info.path.display());
        let channel = CqChannel::open(info)?;
        Ok(Self::with_channel(info.clone(), Box::new(channel)))
    }

    /// Build a session over an already-open channel (hardware or software).
    pub fn with_channel(info: DeviceInfo, channel: Box<dyn ExecChannel>) -> Self {
        tracing::info!(
            "device {} session over {} channel",
            info.index,
            channel.channel_type()
        );
        Self {
            info,
            queue: CommandQueue::new(channel),
            config: None,
        }
    }

    /// Device information.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// CU table of the last completed configure command, if any.
    pub fn config(&self) -> Option<&SchedulerConfig> {
        self.config.as_ref()
    }

    /// The underlying command queue, for concurrent submissions.
    pub fn queue(&mut self) -> &mut CommandQueue<Box<dyn ExecChannel>> {
        &mut self.queue
    }

    /// Configure the scheduler: build, validate against the platform
    /// alignment, submit, wait, retire. Records the CU table on completion.
    ///
    /// Returns the command's terminal state.
    ///
    /// # Errors
    ///
    /// Encoding errors (including a slot size misaligned for this
    /// platform), submission rejections, and an elapsed deadline.
    pub fn configure(&mut self, cmd: &ConfigureCommand, timeout: Duration) -> Result<CmdState> {
        let alignment = self.queue.channel().min_alignment();
        if cmd.slot_size % alignment != 0 {
            return Err(ErtError::Encoding {
                source: EncodingError::MisalignedSlotSize {
                    slot_size: cmd.slot_size,
                    alignment,
                },
            });
        }

        let words = cmd.build()?;
        let sub = self.queue.submit(&words)?;
        let state = self.queue.wait(&sub, timeout)?;
        self.queue.retire(sub)?;

        if state == CmdState::Completed {
            self.config = Some(SchedulerConfig {
                slot_size: cmd.slot_size,
                cu_shift: cmd.cu_shift,
                cu_base_addrs: cmd.cu_base_addrs.clone(),
            });
            tracing::info!(
                "configured scheduler: {} CUs, {}-byte slots",
                cmd.cu_base_addrs.len(),
                cmd.slot_size
            );
        } else {
            tracing::warn!(%state, "configure command did not complete");
        }
        Ok(state)
    }

    /// Start a kernel and wait for its terminal state.
    ///
    /// Validates the command's CU masks against the configured CU table
    /// before submission; the builder cannot do that, it never sees the
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`ErtError::InvalidState`] before configuration or for a mask
    /// selecting an unconfigured CU; submission rejections; an elapsed
    /// deadline.
    pub fn start_kernel(&mut self, cmd: &StartKernelCommand, timeout: Duration) -> Result<CmdState> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ErtError::invalid_state("device not configured"))?;

        let selected = cu::selected_indices(cmd.cu_mask(), cmd.extra_cu_masks());
        if let Some(idx) = selected.iter().find(|idx| **idx >= config.num_cus()) {
            return Err(ErtError::invalid_state(format!(
                "cu mask selects CU {idx} but only {} configured",
                config.num_cus()
            )));
        }

        let words = cmd.build()?;
        let sub = self.queue.submit(&words)?;
        let state = self.queue.wait(&sub, timeout)?;
        if state == CmdState::Completed {
            let code = self.queue.return_code(&sub)?;
            tracing::debug!(code, "kernel return word");
        }
        self.queue.retire(sub)?;

        tracing::debug!(%state, cu_mask = cmd.cu_mask(), "start command terminal");
        Ok(state)
    }
}
