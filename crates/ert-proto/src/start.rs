//! Per-invocation start-kernel command.

use crate::error::EncodingError;
use crate::header::{CmdState, CmdType, Opcode, StartHeader, MAX_EXTRA_CU_MASKS, MAX_PAYLOAD_WORDS};
use crate::regmap::RegisterMap;
use crate::Result;

/// Command that starts one or more compute units with an argument register
/// map.
///
/// Wire layout: `[header][cu_mask][extra_cu_masks...][register_map...]` with
/// header `opcode = StartCu`, `state = New`,
/// `count = 1 + extra_cu_masks + register_map_words`.
#[derive(Debug, Clone)]
pub struct StartKernelCommand {
    cu_mask: u32,
    extra_cu_masks: Vec<u32>,
    regmap: RegisterMap,
}

impl StartKernelCommand {
    /// Start command for the CUs selected by `cu_mask` (CUs 0–31).
    pub fn new(cu_mask: u32, regmap: RegisterMap) -> Self {
        Self {
            cu_mask,
            extra_cu_masks: Vec::new(),
            regmap,
        }
    }

    /// Append extra CU mask words covering CUs 32 and up.
    #[must_use]
    pub fn with_extra_cu_masks(mut self, masks: &[u32]) -> Self {
        self.extra_cu_masks.extend_from_slice(masks);
        self
    }

    /// Mandatory CU mask (CUs 0–31).
    pub fn cu_mask(&self) -> u32 {
        self.cu_mask
    }

    /// Extra CU mask words (CUs 32 and up).
    pub fn extra_cu_masks(&self) -> &[u32] {
        &self.extra_cu_masks
    }

    /// The argument register map.
    pub fn regmap(&self) -> &RegisterMap {
        &self.regmap
    }

    /// Payload words the built command will carry.
    pub fn payload_words(&self) -> usize {
        1 + self.extra_cu_masks.len() + self.regmap.word_count()
    }

    /// Encode into command-buffer words.
    ///
    /// # Errors
    ///
    /// [`EncodingError::NoCuSelected`] when every mask word is zero,
    /// [`EncodingError::TooManyExtraMasks`] beyond the 2-bit header field,
    /// [`EncodingError::PayloadOverflow`] when the register map would
    /// overflow the 11-bit header count field.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self) -> Result<Vec<u32>> {
        if self.cu_mask == 0 && self.extra_cu_masks.iter().all(|m| *m == 0) {
            return Err(EncodingError::NoCuSelected);
        }
        if self.extra_cu_masks.len() > MAX_EXTRA_CU_MASKS {
            return Err(EncodingError::TooManyExtraMasks {
                count: self.extra_cu_masks.len(),
            });
        }
        let count = self.payload_words();
        if count > MAX_PAYLOAD_WORDS {
            return Err(EncodingError::PayloadOverflow {
                words: count,
                max: MAX_PAYLOAD_WORDS,
            });
        }

        let header = StartHeader {
            state: CmdState::New as u32,
            stat_enabled: false,
            extra_cu_masks: self.extra_cu_masks.len() as u32,
            count: count as u32,
            opcode: Opcode::StartCu as u32,
            ty: CmdType::Default as u32,
        };

        let mut words = Vec::with_capacity(1 + count);
        words.push(header.encode());
        words.push(self.cu_mask);
        words.extend_from_slice(&self.extra_cu_masks);
        words.extend_from_slice(&self.regmap.to_words());
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regmap(entries: &[(u32, u32)]) -> RegisterMap {
        let mut map = RegisterMap::new();
        for (offset, value) in entries {
            map.set(*offset, *value).unwrap();
        }
        map
    }

    #[test]
    fn count_covers_mask_and_dense_regmap() {
        // regmap spans offsets 0..=0x44 → 18 words; count = 1 + 18.
        let cmd = StartKernelCommand::new(
            0x1,
            regmap(&[(0, 0), (0x40, 0xaaaa_0000), (0x44, 0x0000_bbbb)]),
        );
        let words = cmd.build().unwrap();
        let header = StartHeader::decode(words[0]);
        assert_eq!(header.opcode, Opcode::StartCu as u32);
        assert_eq!(header.count, 19);
        assert_eq!(header.extra_cu_masks, 0);
        assert_eq!(words.len(), 20);
        assert_eq!(words[1], 0x1);
        // gap between the control word and the argument pair is zero-filled
        assert!(words[3..=2 + 0x3c / 4].iter().all(|w| *w == 0));
        assert_eq!(words[2 + 0x40 / 4], 0xaaaa_0000);
        assert_eq!(words[2 + 0x44 / 4], 0x0000_bbbb);
    }

    #[test]
    fn extra_masks_sit_between_mask_and_regmap() {
        let cmd = StartKernelCommand::new(0x1, regmap(&[(0, 0), (4, 7)]))
            .with_extra_cu_masks(&[0x2, 0x4]);
        let words = cmd.build().unwrap();
        let header = StartHeader::decode(words[0]);
        assert_eq!(header.extra_cu_masks, 2);
        assert_eq!(header.count, 1 + 2 + 2);
        assert_eq!(&words[1..4], &[0x1, 0x2, 0x4]);
        assert_eq!(&words[4..], &[0, 7]);
    }

    #[test]
    fn rejects_zero_mask() {
        let cmd = StartKernelCommand::new(0, regmap(&[(0, 0)]));
        assert_eq!(cmd.build(), Err(EncodingError::NoCuSelected));
    }

    #[test]
    fn extra_mask_alone_selects_a_cu() {
        let cmd = StartKernelCommand::new(0, regmap(&[(0, 0)])).with_extra_cu_masks(&[0x1]);
        assert!(cmd.build().is_ok());
    }

    #[test]
    fn rejects_too_many_extra_masks() {
        let cmd = StartKernelCommand::new(0x1, RegisterMap::new())
            .with_extra_cu_masks(&[1, 2, 3, 4]);
        assert_eq!(
            cmd.build(),
            Err(EncodingError::TooManyExtraMasks { count: 4 })
        );
    }

    #[test]
    fn rejects_oversized_regmap() {
        let mut map = RegisterMap::new();
        map.set(4 * 2047, 1).unwrap();
        let cmd = StartKernelCommand::new(0x1, map);
        assert_eq!(
            cmd.build(),
            Err(EncodingError::PayloadOverflow {
                words: 2049,
                max: 2047
            })
        );
    }
}
