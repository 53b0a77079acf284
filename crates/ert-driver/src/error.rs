//! Error types for driver operations

use ert_proto::{CmdState, EncodingError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, ErtError>;

/// Errors that can occur while submitting and completing commands
#[derive(Debug, Error)]
pub enum ErtError {
    /// Command failed to encode; nothing was handed to the device
    #[error("encoding error: {source}")]
    Encoding {
        /// Underlying encoding error
        #[from]
        source: EncodingError,
    },

    /// Device node not found at the expected path
    #[error("device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// No command-queue devices detected on the system
    #[error("no command-queue devices detected")]
    NoDevicesFound,

    /// Device index out of range
    #[error("device index {index} out of range (have {count} devices)")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Number of available devices
        count: usize,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Device rejected the submission; retrying is caller policy
    #[error("submission rejected: {reason}")]
    Submission {
        /// Reason for rejection
        reason: String,
    },

    /// Bounded wait elapsed. Not evidence of device failure; callers
    /// typically re-poll with a fresh deadline.
    #[error("poll deadline elapsed after {duration_ms}ms")]
    Timeout {
        /// Deadline that elapsed, in milliseconds
        duration_ms: u64,
    },

    /// Command reached a terminal state other than completed.
    /// Detected by inspecting the buffer after a positive poll.
    #[error("device reported command state {state}")]
    Device {
        /// Terminal state the device wrote
        state: CmdState,
    },

    /// Driver-side state machine violation
    #[error("invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },
}

impl ErtError {
    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create a submission rejection error
    pub fn submission(reason: impl Into<String>) -> Self {
        Self::Submission {
            reason: reason.into(),
        }
    }

    /// Create a timeout error from the elapsed deadline
    #[allow(clippy::cast_possible_truncation)]
    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout {
            duration_ms: deadline.as_millis() as u64,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}
