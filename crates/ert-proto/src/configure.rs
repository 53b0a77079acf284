//! One-time scheduler configuration command.

use crate::error::EncodingError;
use crate::header::{CmdState, CmdType, Opcode, PacketHeader, MAX_PAYLOAD_WORDS};
use crate::Result;

/// Fixed payload words ahead of the CU address table:
/// `slot_size`, `num_cus`, `cu_shift`, `cu_base_addr`, feature word.
const FIXED_PAYLOAD_WORDS: usize = 5;

/// Feature flags carried in the configure command's feature word.
///
/// Bit positions are part of the scheduler ABI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Enable the embedded hardware scheduler.
    pub ert: bool,
    /// Scheduler polls CUs instead of taking interrupts.
    pub polling: bool,
    /// Enable the CUDMA offload module.
    pub cu_dma: bool,
    /// Enable the CUISR offload module.
    pub cu_isr: bool,
    /// Enable host-to-scheduler queue interrupts.
    pub cq_int: bool,
    /// A CDMA kernel is present.
    pub cdma: bool,
    /// Dataflow execution mode.
    pub dataflow: bool,
    /// Platform-generation marker, highest bit.
    pub dsa52: bool,
}

impl Features {
    const ERT: u32 = 1;
    const POLLING: u32 = 1 << 1;
    const CU_DMA: u32 = 1 << 2;
    const CU_ISR: u32 = 1 << 3;
    const CQ_INT: u32 = 1 << 4;
    const CDMA: u32 = 1 << 5;
    const DATAFLOW: u32 = 1 << 6;
    const DSA52: u32 = 1 << 31;

    /// Pack into the feature word.
    pub fn encode(self) -> u32 {
        let mut word = 0;
        for (on, bit) in [
            (self.ert, Self::ERT),
            (self.polling, Self::POLLING),
            (self.cu_dma, Self::CU_DMA),
            (self.cu_isr, Self::CU_ISR),
            (self.cq_int, Self::CQ_INT),
            (self.cdma, Self::CDMA),
            (self.dataflow, Self::DATAFLOW),
            (self.dsa52, Self::DSA52),
        ] {
            if on {
                word |= bit;
            }
        }
        word
    }

    /// Unpack from the feature word. Unknown bits are dropped.
    pub const fn decode(word: u32) -> Self {
        Self {
            ert: word & Self::ERT != 0,
            polling: word & Self::POLLING != 0,
            cu_dma: word & Self::CU_DMA != 0,
            cu_isr: word & Self::CU_ISR != 0,
            cq_int: word & Self::CQ_INT != 0,
            cdma: word & Self::CDMA != 0,
            dataflow: word & Self::DATAFLOW != 0,
            dsa52: word & Self::DSA52 != 0,
        }
    }
}

/// One-time configuration command for a newly opened device context.
///
/// Wire layout:
/// `[header][slot_size][num_cus][cu_shift][cu_base_addrs[0]][features][cu_base_addrs...]`
/// with header `opcode = Configure`, `state = New`, `count = 5 + num_cus`.
#[derive(Debug, Clone)]
pub struct ConfigureCommand {
    /// Command queue slot size in bytes.
    pub slot_size: u32,
    /// Shift converting a CU index to its address granularity.
    pub cu_shift: u32,
    /// AXI-Lite base address of every CU, in CU-index order.
    pub cu_base_addrs: Vec<u32>,
    /// Scheduler feature flags.
    pub features: Features,
}

impl ConfigureCommand {
    /// Configuration with default (all-off) features.
    pub fn new(slot_size: u32, cu_shift: u32, cu_base_addrs: Vec<u32>) -> Self {
        Self {
            slot_size,
            cu_shift,
            cu_base_addrs,
            features: Features::default(),
        }
    }

    /// Replace the feature flags.
    #[must_use]
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Payload words the built command will carry.
    pub fn payload_words(&self) -> usize {
        FIXED_PAYLOAD_WORDS + self.cu_base_addrs.len()
    }

    /// Encode into command-buffer words.
    ///
    /// Pure encoding — submission is a separate step owned by the driver.
    ///
    /// # Errors
    ///
    /// [`EncodingError::EmptyCuTable`] without at least one CU address,
    /// [`EncodingError::ZeroSlotSize`] for a zero slot size,
    /// [`EncodingError::PayloadOverflow`] when the CU table would overflow
    /// the 11-bit header count field.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self) -> Result<Vec<u32>> {
        let num_cus = self.cu_base_addrs.len();
        if num_cus == 0 {
            return Err(EncodingError::EmptyCuTable);
        }
        if self.slot_size == 0 {
            return Err(EncodingError::ZeroSlotSize);
        }
        let count = self.payload_words();
        if count > MAX_PAYLOAD_WORDS {
            return Err(EncodingError::PayloadOverflow {
                words: count,
                max: MAX_PAYLOAD_WORDS,
            });
        }

        let header = PacketHeader {
            state: CmdState::New as u32,
            custom: 0,
            count: count as u32,
            opcode: Opcode::Configure as u32,
            ty: CmdType::Default as u32,
        };

        let mut words = Vec::with_capacity(1 + count);
        words.push(header.encode());
        words.push(self.slot_size);
        words.push(num_cus as u32);
        words.push(self.cu_shift);
        words.push(self.cu_base_addrs[0]);
        words.push(self.features.encode());
        words.extend_from_slice(&self.cu_base_addrs);
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_invariant_holds() {
        let cmd = ConfigureCommand::new(1024, 16, vec![0x1000]);
        let words = cmd.build().unwrap();
        let header = PacketHeader::decode(words[0]);
        assert_eq!(header.count, 6);
        assert_eq!(words.len(), 1 + 5 + 1);
        assert_eq!(words.len() * 4, 4 * (1 + 5 + 1));
    }

    #[test]
    fn layout_matches_wire_order() {
        let cmd = ConfigureCommand::new(4096, 16, vec![0x1800_0000, 0x1801_0000]).with_features(
            Features {
                ert: true,
                cu_dma: true,
                cu_isr: true,
                ..Features::default()
            },
        );
        let words = cmd.build().unwrap();
        assert_eq!(words[1], 4096);
        assert_eq!(words[2], 2);
        assert_eq!(words[3], 16);
        assert_eq!(words[4], 0x1800_0000);
        assert!(Features::decode(words[5]).cu_dma);
        assert_eq!(&words[6..], &[0x1800_0000, 0x1801_0000]);
    }

    #[test]
    fn rejects_empty_cu_table() {
        let cmd = ConfigureCommand::new(4096, 16, vec![]);
        assert_eq!(cmd.build(), Err(EncodingError::EmptyCuTable));
    }

    #[test]
    fn rejects_oversized_cu_table() {
        let cmd = ConfigureCommand::new(4096, 16, vec![0x1000; 2100]);
        assert_eq!(
            cmd.build(),
            Err(EncodingError::PayloadOverflow {
                words: 2105,
                max: 2047
            })
        );
    }

    #[test]
    fn rejects_zero_slot_size() {
        let cmd = ConfigureCommand::new(0, 16, vec![0x1000]);
        assert_eq!(cmd.build(), Err(EncodingError::ZeroSlotSize));
    }

    #[test]
    fn feature_word_roundtrip() {
        let features = Features {
            ert: true,
            polling: true,
            cdma: true,
            dsa52: true,
            ..Features::default()
        };
        assert_eq!(Features::decode(features.encode()), features);
        assert_eq!(features.encode() & 0x8000_0000, 0x8000_0000);
    }
}
