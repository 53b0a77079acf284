//! Command submission and completion polling
//!
//! The queue owns the channel plus per-slot bookkeeping and enforces the
//! submission discipline: write buffer, submit, do not touch until the
//! polled state is terminal. Submitted words are copied into the device
//! slot; the slot copy is the one the device mutates, and it is only handed
//! back by [`CommandQueue::retire`] once the command is terminal.
//!
//! Completion is polled, not pushed: [`CommandQueue::poll`] is a bounded,
//! level-triggered wait that never says *which* command finished. Multiple
//! completions collapse into a single positive result, so
//! [`CommandQueue::wait`] re-reads the command's own header state after
//! every wake-up instead of counting events.

use crate::channel::{ExecChannel, PollResult, SlotIndex};
use crate::error::{ErtError, Result};
use ert_proto::{CmdState, PacketHeader, StartHeader};
use std::time::{Duration, Instant};

/// Token for one in-flight command.
///
/// Not clonable: the token is the only capability to observe or retire the
/// slot, and retiring consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Submission {
    slot: SlotIndex,
    seq: u64,
}

impl Submission {
    /// Slot the command occupies.
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    seq: u64,
    busy: bool,
}

/// Host-side view of a device execution queue.
pub struct CommandQueue<C: ExecChannel> {
    channel: C,
    slots: Vec<SlotEntry>,
    next_seq: u64,
}

impl<C: ExecChannel> std::fmt::Debug for CommandQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("channel", &self.channel)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl<C: ExecChannel> CommandQueue<C> {
    /// Wrap a channel in a queue.
    pub fn new(channel: C) -> Self {
        let slots = vec![SlotEntry { seq: 0, busy: false }; channel.slot_count()];
        Self {
            channel,
            slots,
            next_seq: 1,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Commands currently in flight.
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    /// Hand a built command to the device execution queue. Non-blocking.
    ///
    /// The words are copied into a free slot; the caller's buffer stays
    /// inert. Ordering across slots is not guaranteed — commands targeting
    /// disjoint CUs may complete out of submission order. Callers needing
    /// ordering submit serially (submit, wait, submit next).
    ///
    /// # Errors
    ///
    /// [`ErtError::Submission`] when every slot is busy, when the command
    /// does not fit a slot, when the header count disagrees with the buffer
    /// length, or when the channel rejects the hand-off.
    pub fn submit(&mut self, words: &[u32]) -> Result<Submission> {
        let header = match words.first() {
            Some(word) => PacketHeader::decode(*word),
            None => return Err(ErtError::submission("empty command buffer")),
        };
        if header.count as usize + 1 != words.len() {
            return Err(ErtError::submission(format!(
                "header count {} disagrees with buffer length {}",
                header.count,
                words.len()
            )));
        }
        if header.cmd_state() != Some(CmdState::New) {
            return Err(ErtError::submission(format!(
                "command submitted in state {} (expected new)",
                header.state
            )));
        }
        if words.len() * 4 > self.channel.slot_size() {
            return Err(ErtError::submission(format!(
                "command of {} bytes exceeds the {}-byte slot",
                words.len() * 4,
                self.channel.slot_size()
            )));
        }

        let slot = self
            .slots
            .iter()
            .position(|s| !s.busy)
            .ok_or_else(|| ErtError::submission("execution queue full"))?;

        self.channel.exec_buf(slot, words)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[slot] = SlotEntry { seq, busy: true };

        tracing::debug!(
            slot,
            opcode = header.opcode,
            count = header.count,
            "submitted command"
        );

        Ok(Submission { slot, seq })
    }

    /// Single bounded wait for any outstanding command's completion.
    ///
    /// A positive result does not mean exactly one command finished —
    /// re-scan every outstanding command's state afterwards.
    ///
    /// # Errors
    ///
    /// Channel I/O failures only; an elapsed wait is `NoneReady`.
    pub fn poll(&mut self, timeout: Duration) -> Result<PollResult> {
        self.channel.exec_wait(timeout)
    }

    /// Current header state of a command.
    ///
    /// # Errors
    ///
    /// [`ErtError::InvalidState`] for a stale token or a state value no
    /// scheduler generation emits.
    pub fn state(&self, sub: &Submission) -> Result<CmdState> {
        self.check_token(sub)?;
        let header = PacketHeader::decode(self.channel.read_header(sub.slot)?);
        header.cmd_state().ok_or_else(|| {
            ErtError::invalid_state(format!("unrecognized command state {}", header.state))
        })
    }

    /// Block until the command reaches a terminal state or the deadline
    /// elapses. Returns the terminal state; error states are data here, not
    /// errors — convert with [`crate::ensure_completed`] when completion is
    /// required.
    ///
    /// # Errors
    ///
    /// [`ErtError::Timeout`] when the deadline elapses with the command
    /// still in flight. The slot stays pinned until the command eventually
    /// terminates or the device is reset.
    pub fn wait(&mut self, sub: &Submission, timeout: Duration) -> Result<CmdState> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state(sub)?;
            if state.is_terminal() {
                tracing::debug!(slot = sub.slot, %state, "command terminal");
                return Ok(state);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(slot = sub.slot, %state, "wait deadline elapsed");
                return Err(ErtError::timeout(timeout));
            }
            // A positive poll only means "something finished"; the next
            // iteration re-reads this command's own state.
            let _ = self.poll(deadline - now)?;
        }
    }

    /// Free a terminal command's slot and hand its buffer back for
    /// inspection.
    ///
    /// # Errors
    ///
    /// [`ErtError::InvalidState`] if the command is still in flight.
    pub fn retire(&mut self, sub: Submission) -> Result<Vec<u32>> {
        let state = self.state(&sub)?;
        if !state.is_terminal() {
            return Err(ErtError::invalid_state(format!(
                "cannot retire in-flight command (state {state})"
            )));
        }
        let header = PacketHeader::decode(self.channel.read_header(sub.slot)?);
        let slot_words = self.channel.slot_size() / 4;
        let len = (header.count as usize + 1).min(slot_words);
        let mut words = vec![0u32; len];
        self.channel.read_words(sub.slot, 0, &mut words)?;
        self.slots[sub.slot].busy = false;
        tracing::debug!(slot = sub.slot, %state, "retired command");
        Ok(words)
    }

    /// Read the CU return word of a terminal start command.
    ///
    /// The scheduler appends the return word directly after the command
    /// payload, at payload index `count - 1 - extra_cu_masks` past the CU
    /// mask.
    ///
    /// # Errors
    ///
    /// [`ErtError::InvalidState`] if the command is still in flight or the
    /// return word would sit past the slot.
    pub fn return_code(&self, sub: &Submission) -> Result<u32> {
        let state = self.state(sub)?;
        if !state.is_terminal() {
            return Err(ErtError::invalid_state(format!(
                "return code unavailable for in-flight command (state {state})"
            )));
        }
        let header = StartHeader::decode(self.channel.read_header(sub.slot)?);
        let index = ((header.count + 1).saturating_sub(header.extra_cu_masks)) as usize;
        if (index + 1) * 4 > self.channel.slot_size() {
            return Err(ErtError::invalid_state(
                "slot has no room for a return word".to_string(),
            ));
        }
        let mut word = [0u32; 1];
        self.channel.read_words(sub.slot, index, &mut word)?;
        Ok(word[0])
    }

    fn check_token(&self, sub: &Submission) -> Result<()> {
        let entry = self
            .slots
            .get(sub.slot)
            .ok_or_else(|| ErtError::invalid_state(format!("slot {} out of range", sub.slot)))?;
        if !entry.busy || entry.seq != sub.seq {
            return Err(ErtError::invalid_state(format!(
                "stale submission token for slot {}",
                sub.slot
            )));
        }
        Ok(())
    }
}

/// Convert a terminal state into a result: anything but `Completed` becomes
/// [`ErtError::Device`].
///
/// # Errors
///
/// [`ErtError::Device`] carrying the non-completed terminal state.
pub fn ensure_completed(state: CmdState) -> Result<()> {
    match state {
        CmdState::Completed => Ok(()),
        other => Err(ErtError::Device { state: other }),
    }
}
