//! Memory-mapped hardware command-queue channel
//!
//! Binds the command-queue region the platform driver exposes on a
//! `/dev/ertq*` node: a control page (doorbell, status) followed by the slot
//! array. Commands are placed with volatile stores, handed over by ringing
//! the doorbell, and completion events are picked up by polling the node.
//!
//! Slot memory is shared with the device: the scheduler rewrites the header
//! `state` nibble of every in-flight slot, so all slot access is volatile
//! and the host never caches a header value across a poll.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_ptr_alignment)]

use crate::channel::{ChannelType, ExecChannel, PollResult, SlotIndex};
use crate::discovery::{DeviceInfo, DeviceManager, QueueGeometry};
use crate::error::{ErtError, Result};
use ert_proto::PacketHeader;
use rustix::event::{poll, PollFd, PollFlags};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::time::Duration;

/// Control-page register offsets.
///
/// Part of the platform ABI, published with the platform generation — not
/// discovered at runtime.
mod regs {
    /// Write a slot index here to hand that slot to the scheduler.
    pub const DOORBELL: usize = 0x0;
    /// Monotonic completion counter maintained by the scheduler.
    pub const COMPLETION_COUNT: usize = 0x4;
    /// Scheduler status word.
    pub const STATUS: usize = 0x8;
    /// Byte offset of slot 0 from the start of the mapping.
    pub const SLOT_BASE: usize = 0x1000;

    /// Status bit definitions
    pub mod status {
        /// Scheduler is up and accepting commands.
        pub const READY: u32 = 1 << 0;
        /// Scheduler stopped on an internal error.
        pub const ERROR: u32 = 1 << 1;
    }
}

/// Mapped command-queue region shared with the device.
struct MappedQueue {
    ptr: *mut u8,
    size: usize,
}

impl std::fmt::Debug for MappedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedQueue")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("size", &self.size)
            .finish()
    }
}

// SAFETY: Send - MappedQueue owns the mapping exclusively. Moving between
// threads doesn't invalidate it (mmap'd memory is process-wide).
unsafe impl Send for MappedQueue {}

impl MappedQueue {
    /// Map `size` bytes of the device's command-queue region.
    fn map(file: &File, size: usize) -> Result<Self> {
        // SAFETY: mmap necessary to share the command queue with the device.
        // Invariants: (1) file is an open /dev/ertq* node; (2) size covers
        // control page + slot array per discovered geometry; (3) ptr valid
        // for size bytes or Err.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
            .map_err(|e| ErtError::submission(format!("cannot map command queue: {e}")))?
        };

        tracing::debug!("mapped command queue at {ptr:p}, size={size:#x}");

        Ok(Self {
            ptr: ptr.cast(),
            size,
        })
    }

    /// Read a 32-bit word.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped size.
    fn read32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.size, "queue offset out of bounds");
        // SAFETY: read_volatile necessary - the device rewrites slot headers.
        // Invariants: (1) ptr from mmap in map(), valid for self.size;
        // (2) offset+4 <= size; (3) u32 aligned.
        unsafe { std::ptr::read_volatile(self.ptr.add(offset).cast::<u32>()) }
    }

    /// Write a 32-bit word.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the mapped size.
    fn write32(&mut self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.size, "queue offset out of bounds");
        // SAFETY: write_volatile necessary - doorbell and header stores have
        // device side effects. Invariants: (1) ptr from mmap; (2) offset+4
        // <= size; (3) u32 aligned.
        unsafe {
            std::ptr::write_volatile(self.ptr.add(offset).cast::<u32>(), value);
        }
    }
}

impl Drop for MappedQueue {
    fn drop(&mut self) {
        // SAFETY: ptr/size from mmap in map(); Drop runs at most once;
        // no references outlive the channel.
        unsafe {
            // Ignore error in Drop (can't propagate, would need to log)
            let _ = munmap(self.ptr.cast(), self.size);
        }
        tracing::debug!("unmapped command queue");
    }
}

/// Hardware command-queue channel over a `/dev/ertq*` node.
#[derive(Debug)]
pub struct CqChannel {
    file: File,
    region: MappedQueue,
    geometry: QueueGeometry,
}

impl CqChannel {
    /// Open the queue of a discovered device.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be opened, the region cannot be
    /// mapped, or the scheduler reports itself not ready.
    pub fn open(info: &DeviceInfo) -> Result<Self> {
        if !info.path.exists() {
            return Err(ErtError::device_not_found(&info.path));
        }
        let file = OpenOptions::new().read(true).write(true).open(&info.path)?;

        let geometry = info.geometry.clone();
        let size = regs::SLOT_BASE + geometry.slot_count * geometry.slot_size;
        let region = MappedQueue::map(&file, size)?;

        let status = region.read32(regs::STATUS);
        if status & regs::status::ERROR != 0 {
            return Err(ErtError::invalid_state(format!(
                "scheduler stopped on error (status {status:#x})"
            )));
        }
        if status & regs::status::READY == 0 {
            return Err(ErtError::invalid_state(format!(
                "scheduler not ready (status {status:#x})"
            )));
        }

        tracing::info!(
            "opened command queue {}: {} slots x {} bytes",
            info.path.display(),
            geometry.slot_count,
            geometry.slot_size
        );

        Ok(Self {
            file,
            region,
            geometry,
        })
    }

    /// Open by node path, device index, or PCIe address.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery finds no matching device or the queue
    /// cannot be opened.
    pub fn open_named(device: &str) -> Result<Self> {
        let manager = DeviceManager::discover()?;
        let info = manager.resolve(device)?;
        Self::open(info)
    }

    /// Completions the scheduler has recorded since reset.
    pub fn completion_count(&self) -> u32 {
        self.region.read32(regs::COMPLETION_COUNT)
    }

    fn slot_offset(&self, slot: SlotIndex) -> usize {
        regs::SLOT_BASE + slot * self.geometry.slot_size
    }
}

impl ExecChannel for CqChannel {
    fn slot_count(&self) -> usize {
        self.geometry.slot_count
    }

    fn slot_size(&self) -> usize {
        self.geometry.slot_size
    }

    fn min_alignment(&self) -> u32 {
        self.geometry.min_alignment
    }

    fn exec_buf(&mut self, slot: SlotIndex, words: &[u32]) -> Result<()> {
        if slot >= self.geometry.slot_count {
            return Err(ErtError::submission(format!("slot {slot} out of range")));
        }
        if words.is_empty() {
            return Err(ErtError::submission("empty command buffer"));
        }
        if words.len() * 4 > self.geometry.slot_size {
            return Err(ErtError::submission(format!(
                "command of {} bytes exceeds the {}-byte slot",
                words.len() * 4,
                self.geometry.slot_size
            )));
        }
        let state = PacketHeader::decode(self.region.read32(self.slot_offset(slot))).cmd_state();
        if matches!(state, Some(s) if !s.is_terminal()) {
            return Err(ErtError::submission(format!("slot {slot} busy")));
        }

        let base = self.slot_offset(slot);
        // Payload first, header last: the header store publishes the command
        // to a scheduler that may already be scanning slots.
        for (i, word) in words.iter().enumerate().skip(1) {
            self.region.write32(base + i * 4, *word);
        }
        self.region.write32(base, words[0]);
        self.region.write32(regs::DOORBELL, slot as u32);
        Ok(())
    }

    fn exec_wait(&mut self, timeout: Duration) -> Result<PollResult> {
        let mut fds = [PollFd::new(&self.file, PollFlags::IN)];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let ready = poll(&mut fds, timeout_ms)
            .map_err(|e| ErtError::Io {
                source: std::io::Error::from(e),
            })?;
        if ready == 0 {
            Ok(PollResult::NoneReady)
        } else {
            Ok(PollResult::Ready)
        }
    }

    fn read_header(&self, slot: SlotIndex) -> Result<u32> {
        if slot >= self.geometry.slot_count {
            return Err(ErtError::invalid_state(format!("slot {slot} out of range")));
        }
        Ok(self.region.read32(self.slot_offset(slot)))
    }

    fn read_words(&self, slot: SlotIndex, offset_words: usize, out: &mut [u32]) -> Result<()> {
        if slot >= self.geometry.slot_count {
            return Err(ErtError::invalid_state(format!("slot {slot} out of range")));
        }
        let end = (offset_words + out.len()) * 4;
        if end > self.geometry.slot_size {
            return Err(ErtError::invalid_state(format!(
                "read of {} words at {offset_words} runs past the slot",
                out.len()
            )));
        }
        let base = self.slot_offset(slot) + offset_words * 4;
        for (i, word) in out.iter_mut().enumerate() {
            *word = self.region.read32(base + i * 4);
        }
        Ok(())
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Cq
    }
}
