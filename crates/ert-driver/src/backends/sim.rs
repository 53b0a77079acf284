//! Software scheduler channel
//!
//! Implements [`ExecChannel`] with an in-process model of the embedded
//! scheduler: commands are validated and executed against an internal CU
//! table, slot headers move through the same state machine the hardware
//! drives, and completions surface through `exec_wait` exactly like the
//! level-triggered hardware signal — including the collapse of several
//! completions into one positive poll.
//!
//! This enables:
//!
//! 1. **CI without hardware**: the full submission discipline is exercised
//!    with no device present.
//! 2. **Poll-semantics testing**: `completion_lag` delays completions by a
//!    number of `exec_wait` calls, so deadline and re-scan behavior is
//!    observable deterministically.
//! 3. **Ground truth for channel parity**: the hardware channel is expected
//!    to produce the same terminal states for the same command streams.

use crate::channel::{ChannelType, ExecChannel, PollResult, SlotIndex};
use crate::error::{ErtError, Result};
use ert_proto::{cu, header, CmdState, Opcode, PacketHeader, StartHeader};
use std::time::Duration;

/// Default geometry when no deployment parameters are supplied.
const DEFAULT_SLOT_COUNT: usize = 16;
/// Default slot size in bytes.
const DEFAULT_SLOT_SIZE: usize = 4096;

/// CU table recorded from a completed configure command.
#[derive(Debug, Clone)]
struct CuTable {
    num_cus: u32,
}

/// One modeled command slot.
#[derive(Debug, Clone)]
struct Slot {
    words: Vec<u32>,
    /// `exec_wait` call count at which the command terminates;
    /// `u64::MAX` models a hung CU.
    due: Option<u64>,
    outcome: CmdState,
    return_index: Option<usize>,
}

/// In-process scheduler model.
#[derive(Debug)]
pub struct SimChannel {
    slot_size: usize,
    slots: Vec<Slot>,
    cu_table: Option<CuTable>,
    completion_lag: u64,
    hang_next: bool,
    wait_calls: u64,
    unreported: usize,
}

impl SimChannel {
    /// Model with explicit queue geometry.
    pub fn new(slot_count: usize, slot_size: usize) -> Self {
        let slots = vec![
            Slot {
                words: vec![0; slot_size / 4],
                due: None,
                outcome: CmdState::Completed,
                return_index: None,
            };
            slot_count
        ];
        Self {
            slot_size,
            slots,
            cu_table: None,
            completion_lag: 0,
            hang_next: false,
            wait_calls: 0,
            unreported: 0,
        }
    }

    /// Model with the default deployment geometry.
    pub fn with_default_geometry() -> Self {
        Self::new(DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE)
    }

    /// Delay completions by `lag` `exec_wait` calls.
    #[must_use]
    pub fn with_completion_lag(mut self, lag: u64) -> Self {
        self.completion_lag = lag;
        self
    }

    /// Make the next submitted command hang forever — the hung-CU case
    /// where only a device reset frees the slot.
    pub fn hang_next(&mut self) {
        self.hang_next = true;
    }

    /// Whether a configure command has been accepted.
    pub fn configured(&self) -> bool {
        self.cu_table.is_some()
    }

    /// Decide a command's outcome. Runs at submission; takes effect at the
    /// slot's due time.
    fn evaluate(&mut self, words: &[u32]) -> (CmdState, Option<usize>) {
        let header = PacketHeader::decode(words[0]);
        if words.len() != header.count as usize + 1 {
            return (CmdState::Error, None);
        }
        match header.cmd_opcode() {
            Some(Opcode::Configure) => self.evaluate_configure(&header, words),
            Some(Opcode::StartCu | Opcode::ExecWrite) => self.evaluate_start(words),
            _ => {
                tracing::debug!(opcode = header.opcode, "scheduler rejects unknown opcode");
                (CmdState::Error, None)
            }
        }
    }

    fn evaluate_configure(&mut self, header: &PacketHeader, words: &[u32]) -> (CmdState, Option<usize>) {
        // [slot_size][num_cus][cu_shift][cu_base_addr][features][table...]
        if header.count < 6 {
            return (CmdState::Error, None);
        }
        let num_cus = words[2];
        if header.count as usize != 5 + num_cus as usize {
            return (CmdState::Error, None);
        }
        self.cu_table = Some(CuTable { num_cus });
        tracing::debug!(num_cus, "scheduler configured");
        (CmdState::Completed, None)
    }

    fn evaluate_start(&self, words: &[u32]) -> (CmdState, Option<usize>) {
        let Some(table) = &self.cu_table else {
            tracing::debug!("start command before configure");
            return (CmdState::Error, None);
        };
        let header = StartHeader::decode(words[0]);
        let extra = header.extra_cu_masks as usize;
        if words.len() < 2 + extra {
            return (CmdState::Error, None);
        }
        let cu_mask = words[1];
        let selected = cu::selected_indices(cu_mask, &words[2..2 + extra]);
        if selected.is_empty() || selected.iter().any(|idx| *idx >= table.num_cus) {
            return (CmdState::Error, None);
        }
        let return_index = (header.count + 1 - header.extra_cu_masks) as usize;
        (CmdState::Completed, Some(return_index))
    }
}

impl ExecChannel for SimChannel {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_size(&self) -> usize {
        self.slot_size
    }

    fn min_alignment(&self) -> u32 {
        // The model accepts any word-multiple slot size.
        4
    }

    fn exec_buf(&mut self, slot: SlotIndex, words: &[u32]) -> Result<()> {
        if slot >= self.slots.len() {
            return Err(ErtError::submission(format!("slot {slot} out of range")));
        }
        if words.is_empty() {
            return Err(ErtError::submission("empty command buffer"));
        }
        if words.len() * 4 > self.slot_size {
            return Err(ErtError::submission(format!(
                "command of {} bytes exceeds the {}-byte slot",
                words.len() * 4,
                self.slot_size
            )));
        }
        if self.slots[slot].due.is_some() {
            return Err(ErtError::submission(format!("slot {slot} busy")));
        }

        let (outcome, return_index) = self.evaluate(words);

        let entry = &mut self.slots[slot];
        entry.words.fill(0);
        entry.words[..words.len()].copy_from_slice(words);
        entry.words[0] = header::with_state(entry.words[0], CmdState::Running);
        entry.outcome = outcome;
        entry.return_index = return_index;
        entry.due = Some(if self.hang_next {
            u64::MAX
        } else {
            self.wait_calls + self.completion_lag
        });
        self.hang_next = false;
        Ok(())
    }

    fn exec_wait(&mut self, timeout: Duration) -> Result<PollResult> {
        self.wait_calls += 1;
        for slot in &mut self.slots {
            let Some(due) = slot.due else { continue };
            if due >= self.wait_calls {
                continue;
            }
            slot.words[0] = header::with_state(slot.words[0], slot.outcome);
            if slot.outcome == CmdState::Completed {
                if let Some(index) = slot.return_index {
                    if index < slot.words.len() {
                        slot.words[index] = 0;
                    }
                }
            }
            slot.due = None;
            self.unreported += 1;
        }

        if self.unreported > 0 {
            // Completions collapse: however many terminated, one Ready.
            self.unreported = 0;
            Ok(PollResult::Ready)
        } else {
            std::thread::sleep(timeout.min(Duration::from_micros(200)));
            Ok(PollResult::NoneReady)
        }
    }

    fn read_header(&self, slot: SlotIndex) -> Result<u32> {
        let entry = self
            .slots
            .get(slot)
            .ok_or_else(|| ErtError::invalid_state(format!("slot {slot} out of range")))?;
        Ok(entry.words[0])
    }

    fn read_words(&self, slot: SlotIndex, offset_words: usize, out: &mut [u32]) -> Result<()> {
        let entry = self
            .slots
            .get(slot)
            .ok_or_else(|| ErtError::invalid_state(format!("slot {slot} out of range")))?;
        let end = offset_words + out.len();
        if end > entry.words.len() {
            return Err(ErtError::invalid_state(format!(
                "read of words {offset_words}..{end} runs past the slot"
            )));
        }
        out.copy_from_slice(&entry.words[offset_words..end]);
        Ok(())
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ert_proto::ConfigureCommand;

    #[test]
    fn configure_records_cu_table() {
        let mut sim = SimChannel::new(4, 4096);
        let words = ConfigureCommand::new(1024, 16, vec![0x1000]).build().unwrap();
        sim.exec_buf(0, &words).unwrap();
        assert!(sim.configured());
        assert_eq!(
            PacketHeader::decode(sim.read_header(0).unwrap()).cmd_state(),
            Some(CmdState::Running)
        );
    }

    #[test]
    fn completion_surfaces_on_wait() {
        let mut sim = SimChannel::new(4, 4096);
        let words = ConfigureCommand::new(1024, 16, vec![0x1000]).build().unwrap();
        sim.exec_buf(0, &words).unwrap();
        assert_eq!(
            sim.exec_wait(Duration::from_millis(1)).unwrap(),
            PollResult::Ready
        );
        assert_eq!(
            PacketHeader::decode(sim.read_header(0).unwrap()).cmd_state(),
            Some(CmdState::Completed)
        );
    }

    #[test]
    fn completion_lag_delays_by_wait_calls() {
        let mut sim = SimChannel::new(4, 4096).with_completion_lag(2);
        let words = ConfigureCommand::new(1024, 16, vec![0x1000]).build().unwrap();
        sim.exec_buf(0, &words).unwrap();
        assert_eq!(
            sim.exec_wait(Duration::from_millis(1)).unwrap(),
            PollResult::NoneReady
        );
        assert_eq!(
            sim.exec_wait(Duration::from_millis(1)).unwrap(),
            PollResult::NoneReady
        );
        assert_eq!(
            sim.exec_wait(Duration::from_millis(1)).unwrap(),
            PollResult::Ready
        );
    }

    #[test]
    fn busy_slot_rejected() {
        let mut sim = SimChannel::new(1, 4096).with_completion_lag(10);
        let words = ConfigureCommand::new(1024, 16, vec![0x1000]).build().unwrap();
        sim.exec_buf(0, &words).unwrap();
        assert!(matches!(
            sim.exec_buf(0, &words),
            Err(ErtError::Submission { .. })
        ));
    }
}
