//! Execution-channel abstraction
//!
//! Provides a unified interface over the device's execution queue: the
//! hardware command-queue mapping and the in-process scheduler model both
//! implement it. The channel is deliberately dumb — geometry queries, slot
//! hand-off, a bounded completion wait, and slot read-back. Everything
//! stateful (slot allocation, deadlines, retirement) lives in
//! [`crate::CommandQueue`].

use crate::error::Result;
use std::fmt::Debug;
use std::time::Duration;

/// Index of a command slot in the device execution queue.
pub type SlotIndex = usize;

/// Outcome of one bounded completion wait.
///
/// The signal is level-triggered and non-specific: `Ready` means one *or
/// more* outstanding commands reached a terminal state since the last wait,
/// and never identifies which. Callers re-scan the header state of every
/// outstanding command after a positive result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The bounded wait elapsed with no completion event.
    NoneReady,
    /// At least one command completed; re-scan outstanding commands.
    Ready,
}

/// Execution-queue channel trait
///
/// The device side of submission: hand a built command to a slot, wait for
/// completion events, read slots back. The device owns the header `state`
/// field of every in-flight slot; the host observes it through
/// [`ExecChannel::read_header`].
pub trait ExecChannel: Debug + Send {
    /// Number of command slots in the execution queue.
    fn slot_count(&self) -> usize;

    /// Bytes per command slot.
    fn slot_size(&self) -> usize;

    /// Minimum transfer alignment in bytes. A deployment parameter of the
    /// platform, used to validate configure-time slot sizes.
    fn min_alignment(&self) -> u32;

    /// Hand a fully built command to the execution queue.
    ///
    /// Non-blocking enqueue. The channel copies the words; the caller's
    /// buffer is inert afterwards and the slot copy is the one the device
    /// mutates.
    ///
    /// # Errors
    ///
    /// Returns a submission error if the device rejects the command
    /// (slot out of range, busy, or command larger than the slot).
    fn exec_buf(&mut self, slot: SlotIndex, words: &[u32]) -> Result<()>;

    /// Single bounded wait for *any* outstanding command's completion.
    ///
    /// Multiple completions collapse into one `Ready`.
    ///
    /// # Errors
    ///
    /// Returns an error only for channel I/O failures; an elapsed wait is
    /// the `NoneReady` result, not an error.
    fn exec_wait(&mut self, timeout: Duration) -> Result<PollResult>;

    /// Re-read the header word of a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is out of range or unreadable.
    fn read_header(&self, slot: SlotIndex) -> Result<u32>;

    /// Read `out.len()` words from a slot starting at `offset_words`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would run past the slot.
    fn read_words(&self, slot: SlotIndex, offset_words: usize, out: &mut [u32]) -> Result<()>;

    /// Get channel type for debugging
    fn channel_type(&self) -> ChannelType;
}

impl<T: ExecChannel + ?Sized> ExecChannel for Box<T> {
    fn slot_count(&self) -> usize {
        (**self).slot_count()
    }

    fn slot_size(&self) -> usize {
        (**self).slot_size()
    }

    fn min_alignment(&self) -> u32 {
        (**self).min_alignment()
    }

    fn exec_buf(&mut self, slot: SlotIndex, words: &[u32]) -> Result<()> {
        (**self).exec_buf(slot, words)
    }

    fn exec_wait(&mut self, timeout: Duration) -> Result<PollResult> {
        (**self).exec_wait(timeout)
    }

    fn read_header(&self, slot: SlotIndex) -> Result<u32> {
        (**self).read_header(slot)
    }

    fn read_words(&self, slot: SlotIndex, offset_words: usize, out: &mut [u32]) -> Result<()> {
        (**self).read_words(slot, offset_words, out)
    }

    fn channel_type(&self) -> ChannelType {
        (**self).channel_type()
    }
}

/// Channel type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Mapped hardware command queue (/dev/ertq*)
    Cq,

    /// In-process scheduler model, no hardware required
    Sim,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cq => write!(f, "CQ"),
            Self::Sim => write!(f, "Sim (software scheduler)"),
        }
    }
}

/// Channel selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelection {
    /// Automatically select best available
    Auto,

    /// Force the mapped hardware command queue
    Cq,

    /// Force the software scheduler model
    Sim,
}

/// Select an execution channel based on availability and requirements.
///
/// `device` is a node path (`/dev/ertq0`), a device index (`0`), or a PCIe
/// address, resolved through discovery for the hardware channel.
///
/// # Errors
///
/// Returns an error if no suitable channel can be opened for the device.
pub fn select_channel(
    selection: ChannelSelection,
    device: &str,
) -> Result<Box<dyn ExecChannel>> {
    use crate::backends::cq::CqChannel;
    use crate::backends::sim::SimChannel;

    match selection {
        ChannelSelection::Auto => {
            match CqChannel::open_named(device) {
                Ok(channel) => {
                    tracing::info!("Using mapped command queue for {device}");
                    Ok(Box::new(channel))
                }
                Err(e) => {
                    tracing::info!("Hardware queue unavailable ({e}), using software scheduler");
                    Ok(Box::new(SimChannel::with_default_geometry()))
                }
            }
        }

        ChannelSelection::Cq => {
            CqChannel::open_named(device).map(|c| Box::new(c) as Box<dyn ExecChannel>)
        }

        ChannelSelection::Sim => Ok(Box::new(SimChannel::with_default_geometry())),
    }
}
