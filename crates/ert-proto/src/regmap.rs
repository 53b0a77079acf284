//! CU register-map construction.

use crate::error::EncodingError;
use crate::Result;
use std::collections::BTreeMap;

/// Register map for a CU's AXI-Lite control space.
///
/// Offsets are byte offsets into the control interface and must be
/// word-aligned. Rendering produces a dense word array from offset 0 through
/// the highest written offset, gaps zero-filled — the scheduler copies this
/// array straight onto the CU, so the layout is an ABI contract with the
/// synthesized kernel and is not validated beyond alignment and collisions.
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    words: BTreeMap<u32, u32>,
}

impl RegisterMap {
    /// Empty register map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one 32-bit register.
    ///
    /// # Errors
    ///
    /// [`EncodingError::UnalignedOffset`] if `offset` is not a multiple of 4,
    /// [`EncodingError::OffsetCollision`] if `offset` was already written.
    pub fn set(&mut self, offset: u32, value: u32) -> Result<()> {
        if offset % 4 != 0 {
            return Err(EncodingError::UnalignedOffset { offset });
        }
        if self.words.contains_key(&offset) {
            return Err(EncodingError::OffsetCollision { offset });
        }
        self.words.insert(offset, value);
        Ok(())
    }

    /// Write a 64-bit argument as its lo/hi word pair at `offset` and
    /// `offset + 4`.
    ///
    /// The split is explicit caller policy: the protocol never widens values
    /// on its own, and only the layer that knows the kernel's argument
    /// signature can decide an argument is 64 bits wide.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RegisterMap::set`], for either half.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_arg64(&mut self, offset: u32, value: u64) -> Result<()> {
        self.set(offset, value as u32)?;
        self.set(offset + 4, (value >> 32) as u32)
    }

    /// Whether any register has been written.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words the dense rendering occupies (0 for an empty map).
    pub fn word_count(&self) -> usize {
        self.words
            .keys()
            .next_back()
            .map_or(0, |hi| (hi / 4 + 1) as usize)
    }

    /// Render the dense word array, zero-filling unwritten gaps.
    pub fn to_words(&self) -> Vec<u32> {
        let mut out = vec![0u32; self.word_count()];
        for (offset, value) in &self.words {
            out[(offset / 4) as usize] = *value;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_rendering_zero_fills_gaps() {
        let mut map = RegisterMap::new();
        map.set(0, 0x11).unwrap();
        map.set(4, 0x22).unwrap();
        map.set(12, 0x44).unwrap();
        assert_eq!(map.word_count(), 4);
        assert_eq!(map.to_words(), vec![0x11, 0x22, 0, 0x44]);
    }

    #[test]
    fn rejects_unaligned_offset() {
        let mut map = RegisterMap::new();
        assert_eq!(
            map.set(6, 1),
            Err(EncodingError::UnalignedOffset { offset: 6 })
        );
    }

    #[test]
    fn rejects_offset_collision() {
        let mut map = RegisterMap::new();
        map.set(16, 1).unwrap();
        assert_eq!(
            map.set(16, 2),
            Err(EncodingError::OffsetCollision { offset: 16 })
        );
    }

    #[test]
    fn arg64_splits_lo_then_hi() {
        let mut map = RegisterMap::new();
        map.set_arg64(0x40, 0x0000_bbbb_aaaa_0000).unwrap();
        let words = map.to_words();
        assert_eq!(words[0x40 / 4], 0xaaaa_0000);
        assert_eq!(words[0x44 / 4], 0x0000_bbbb);
    }

    #[test]
    fn empty_map_renders_nothing() {
        let map = RegisterMap::new();
        assert!(map.is_empty());
        assert_eq!(map.word_count(), 0);
        assert!(map.to_words().is_empty());
    }
}
