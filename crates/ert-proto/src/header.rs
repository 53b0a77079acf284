//! Command header codec.
//!
//! Every command starts with one little-endian 32-bit header word. Two layout
//! variants exist: the generic layout used by configure-class commands, and
//! the start-kernel layout that repurposes the custom byte for `stat_enabled`
//! and `extra_cu_masks`.
//!
//! Fields are packed with explicit shift-and-mask. C-style bitfield layout is
//! implementation-defined and is never trusted for a wire format.

/// Bit positions and widths for both header variants.
pub mod bits {
    /// `state` shift (bits \[3:0\], both variants).
    pub const STATE_SHIFT: u32 = 0;
    /// `state` mask (4 bits).
    pub const STATE_MASK: u32 = 0xf;

    /// `custom` byte shift (bits \[11:4\], generic variant).
    pub const CUSTOM_SHIFT: u32 = 4;
    /// `custom` mask (8 bits).
    pub const CUSTOM_MASK: u32 = 0xff;

    /// `stat_enabled` bit (bit \[4\], start-kernel variant).
    pub const STAT_ENABLED_SHIFT: u32 = 4;
    /// `extra_cu_masks` shift (bits \[11:10\], start-kernel variant).
    pub const EXTRA_CU_MASKS_SHIFT: u32 = 10;
    /// `extra_cu_masks` mask (2 bits).
    pub const EXTRA_CU_MASKS_MASK: u32 = 0x3;

    /// `count` shift (bits \[22:12\], both variants).
    pub const COUNT_SHIFT: u32 = 12;
    /// `count` mask (11 bits).
    pub const COUNT_MASK: u32 = 0x7ff;

    /// `opcode` shift (bits \[27:23\], both variants).
    pub const OPCODE_SHIFT: u32 = 23;
    /// `opcode` mask (5 bits).
    pub const OPCODE_MASK: u32 = 0x1f;

    /// `type` shift (bits \[31:28\], both variants).
    pub const TYPE_SHIFT: u32 = 28;
    /// `type` mask (4 bits).
    pub const TYPE_MASK: u32 = 0xf;
}

/// Maximum payload words representable in the 11-bit `count` field.
pub const MAX_PAYLOAD_WORDS: usize = bits::COUNT_MASK as usize;

/// Maximum extra CU masks representable in the 2-bit header field.
pub const MAX_EXTRA_CU_MASKS: usize = bits::EXTRA_CU_MASKS_MASK as usize;

/// Command lifecycle states as written into the header `state` field.
///
/// The host writes `New`; every later transition is owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CmdState {
    /// Set by the host before submission.
    New = 1,
    /// Accepted into the execution queue.
    Queued = 2,
    /// A CU is executing the command.
    Running = 3,
    /// Finished without error.
    Completed = 4,
    /// Finished with a device-reported error.
    Error = 5,
    /// Aborted before completion.
    Abort = 6,
    /// Handed to the scheduler, not yet queued.
    Submitted = 7,
    /// The scheduler gave up waiting on the CU.
    Timeout = 8,
    /// The CU never responded.
    NoResponse = 9,
    /// Soft-kernel returned an error code.
    SkError = 10,
    /// Soft-kernel crashed.
    SkCrashed = 11,
}

impl CmdState {
    /// Typed view of a raw `state` field. `None` for values no scheduler
    /// generation emits.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::New),
            2 => Some(Self::Queued),
            3 => Some(Self::Running),
            4 => Some(Self::Completed),
            5 => Some(Self::Error),
            6 => Some(Self::Abort),
            7 => Some(Self::Submitted),
            8 => Some(Self::Timeout),
            9 => Some(Self::NoResponse),
            10 => Some(Self::SkError),
            11 => Some(Self::SkCrashed),
            _ => None,
        }
    }

    /// Whether the device is done with the command (successfully or not).
    /// A terminal slot may be retired and its buffer inspected.
    pub const fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::New | Self::Queued | Self::Running | Self::Submitted
        )
    }
}

impl std::fmt::Display for CmdState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Abort => "abort",
            Self::Submitted => "submitted",
            Self::Timeout => "timeout",
            Self::NoResponse => "no-response",
            Self::SkError => "sk-error",
            Self::SkCrashed => "sk-crashed",
        };
        f.write_str(name)
    }
}

/// Command opcodes carried by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    /// Start a workgroup on a CU.
    StartCu = 0,
    /// Configure the scheduler (one-time, per device context).
    Configure = 2,
    /// Stop the scheduler.
    Exit = 3,
    /// Abort a previously submitted command.
    Abort = 4,
    /// Start a CU after writing its registers directly.
    ExecWrite = 5,
    /// Query CU execution statistics.
    CuStat = 6,
}

impl Opcode {
    /// Typed view of a raw `opcode` field.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::StartCu),
            2 => Some(Self::Configure),
            3 => Some(Self::Exit),
            4 => Some(Self::Abort),
            5 => Some(Self::ExecWrite),
            6 => Some(Self::CuStat),
            _ => None,
        }
    }
}

/// Command types as consumed by the scheduler's dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum CmdType {
    /// Default dispatch.
    #[default]
    Default = 0,
    /// Processed host-side by the kernel scheduler.
    KdsLocal = 1,
    /// Control command, uses the reserved queue slot.
    Ctrl = 2,
    /// Compute-unit command.
    Cu = 3,
}

/// Generic header fields, exactly as packed on the wire.
///
/// Decoding is mechanical: unknown or out-of-range values are preserved
/// as-is, matching what the hardware would see. There is deliberately no
/// failure mode — use [`CmdState::from_raw`] and friends for typed views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Command state (4 bits).
    pub state: u32,
    /// Per-command-kind custom byte (8 bits).
    pub custom: u32,
    /// Payload words following the header (11 bits).
    pub count: u32,
    /// Command opcode (5 bits).
    pub opcode: u32,
    /// Command type (4 bits).
    pub ty: u32,
}

impl PacketHeader {
    /// Pack into the wire word. Out-of-range fields are masked to width.
    pub const fn encode(&self) -> u32 {
        use bits::{
            COUNT_MASK, COUNT_SHIFT, CUSTOM_MASK, CUSTOM_SHIFT, OPCODE_MASK, OPCODE_SHIFT,
            STATE_MASK, STATE_SHIFT, TYPE_MASK, TYPE_SHIFT,
        };
        (self.state & STATE_MASK) << STATE_SHIFT
            | (self.custom & CUSTOM_MASK) << CUSTOM_SHIFT
            | (self.count & COUNT_MASK) << COUNT_SHIFT
            | (self.opcode & OPCODE_MASK) << OPCODE_SHIFT
            | (self.ty & TYPE_MASK) << TYPE_SHIFT
    }

    /// Unpack from the wire word.
    pub const fn decode(word: u32) -> Self {
        use bits::{
            COUNT_MASK, COUNT_SHIFT, CUSTOM_MASK, CUSTOM_SHIFT, OPCODE_MASK, OPCODE_SHIFT,
            STATE_MASK, STATE_SHIFT, TYPE_MASK, TYPE_SHIFT,
        };
        Self {
            state: (word >> STATE_SHIFT) & STATE_MASK,
            custom: (word >> CUSTOM_SHIFT) & CUSTOM_MASK,
            count: (word >> COUNT_SHIFT) & COUNT_MASK,
            opcode: (word >> OPCODE_SHIFT) & OPCODE_MASK,
            ty: (word >> TYPE_SHIFT) & TYPE_MASK,
        }
    }

    /// Typed view of the `state` field.
    pub const fn cmd_state(&self) -> Option<CmdState> {
        CmdState::from_raw(self.state)
    }

    /// Typed view of the `opcode` field.
    pub const fn cmd_opcode(&self) -> Option<Opcode> {
        Opcode::from_raw(self.opcode)
    }
}

/// Start-kernel header fields.
///
/// Same upper bits as [`PacketHeader`]; the custom byte splits into
/// `stat_enabled` and `extra_cu_masks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHeader {
    /// Command state (4 bits).
    pub state: u32,
    /// Record per-state timestamps after the payload.
    pub stat_enabled: bool,
    /// CU mask words following the mandatory mask (2 bits).
    pub extra_cu_masks: u32,
    /// Payload words following the header (11 bits).
    pub count: u32,
    /// Command opcode (5 bits).
    pub opcode: u32,
    /// Command type (4 bits).
    pub ty: u32,
}

impl StartHeader {
    /// Pack into the wire word. Out-of-range fields are masked to width.
    pub const fn encode(&self) -> u32 {
        use bits::{
            COUNT_MASK, COUNT_SHIFT, EXTRA_CU_MASKS_MASK, EXTRA_CU_MASKS_SHIFT, OPCODE_MASK,
            OPCODE_SHIFT, STATE_MASK, STATE_SHIFT, STAT_ENABLED_SHIFT, TYPE_MASK, TYPE_SHIFT,
        };
        let stat = if self.stat_enabled { 1 } else { 0 };
        (self.state & STATE_MASK) << STATE_SHIFT
            | stat << STAT_ENABLED_SHIFT
            | (self.extra_cu_masks & EXTRA_CU_MASKS_MASK) << EXTRA_CU_MASKS_SHIFT
            | (self.count & COUNT_MASK) << COUNT_SHIFT
            | (self.opcode & OPCODE_MASK) << OPCODE_SHIFT
            | (self.ty & TYPE_MASK) << TYPE_SHIFT
    }

    /// Unpack from the wire word.
    pub const fn decode(word: u32) -> Self {
        use bits::{
            COUNT_MASK, COUNT_SHIFT, EXTRA_CU_MASKS_MASK, EXTRA_CU_MASKS_SHIFT, OPCODE_MASK,
            OPCODE_SHIFT, STATE_MASK, STATE_SHIFT, STAT_ENABLED_SHIFT, TYPE_MASK, TYPE_SHIFT,
        };
        Self {
            state: (word >> STATE_SHIFT) & STATE_MASK,
            stat_enabled: (word >> STAT_ENABLED_SHIFT) & 0x1 != 0,
            extra_cu_masks: (word >> EXTRA_CU_MASKS_SHIFT) & EXTRA_CU_MASKS_MASK,
            count: (word >> COUNT_SHIFT) & COUNT_MASK,
            opcode: (word >> OPCODE_SHIFT) & OPCODE_MASK,
            ty: (word >> TYPE_SHIFT) & TYPE_MASK,
        }
    }
}

/// Rewrite only the `state` field of a header word.
///
/// This is the single mutation the device performs on an in-flight command;
/// the software scheduler model uses it the same way.
pub const fn with_state(word: u32, state: CmdState) -> u32 {
    (word & !(bits::STATE_MASK << bits::STATE_SHIFT)) | (state as u32) << bits::STATE_SHIFT
}
