//! Bit-exact model of the embedded-runtime (ERT) command protocol.
//!
//! This crate has **no dependencies on hardware access** — it is a pure model
//! of the command-buffer wire format consumed by the on-device scheduler:
//! header bit layouts, command construction, CU addressing.
//!
//! Commands are built host-side, handed to an execution queue, and mutated in
//! place by the device while in flight. Only the construction half lives here;
//! submission and polling belong to `ert-driver`.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`header`] | 32-bit header codec, both layout variants, state/opcode enums |
//! | [`configure`] | One-time scheduler configuration command |
//! | [`start`] | Per-invocation start-kernel command |
//! | [`regmap`] | CU register-map construction (AXI-Lite layout) |
//! | [`cu`] | CU index ↔ mask-word/address arithmetic |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod configure;
pub mod cu;
mod error;
pub mod header;
pub mod regmap;
pub mod start;

pub use configure::{ConfigureCommand, Features};
pub use error::EncodingError;
pub use header::{CmdState, CmdType, Opcode, PacketHeader, StartHeader};
pub use regmap::RegisterMap;
pub use start::StartKernelCommand;

/// Result type alias for command encoding.
pub type Result<T> = std::result::Result<T, EncodingError>;
