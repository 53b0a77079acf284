//! Encoding errors for command construction.

use thiserror::Error;

/// Errors raised while constructing a command buffer.
///
/// All of these are caught host-side; a command that fails to encode is
/// never handed to the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Register-map offset is not 32-bit word aligned
    #[error("register offset {offset:#x} is not word-aligned")]
    UnalignedOffset {
        /// Offending byte offset
        offset: u32,
    },

    /// Two register-map entries target the same offset
    #[error("register offset {offset:#x} written twice")]
    OffsetCollision {
        /// Offending byte offset
        offset: u32,
    },

    /// Payload does not fit the 11-bit header count field
    #[error("payload of {words} words exceeds the {max}-word header count field")]
    PayloadOverflow {
        /// Words the command would need
        words: usize,
        /// Capacity of the count field
        max: usize,
    },

    /// Configure command carries no compute units
    #[error("configure command requires at least one compute unit address")]
    EmptyCuTable,

    /// Start command selects no compute unit
    #[error("start command selects no compute unit (cu_mask is zero)")]
    NoCuSelected,

    /// More extra CU masks than the 2-bit header field can describe
    #[error("{count} extra CU masks exceed the 2-bit header field")]
    TooManyExtraMasks {
        /// Extra masks supplied
        count: usize,
    },

    /// Slot size of zero
    #[error("command queue slot size must be non-zero")]
    ZeroSlotSize,

    /// Slot size not a multiple of the platform transfer alignment.
    /// The alignment is a deployment parameter supplied by the driver layer.
    #[error("slot size {slot_size} is not a multiple of the platform alignment {alignment}")]
    MisalignedSlotSize {
        /// Requested slot size in bytes
        slot_size: u32,
        /// Platform minimum transfer alignment in bytes
        alignment: u32,
    },
}
