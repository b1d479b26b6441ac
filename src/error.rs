//! Custom error types for the library.
//!
//! This module defines the primary error type, `ShfError`, covering every
//! failure mode of the orchestration layer. Using the `thiserror` crate, each
//! variant keeps enough context for the caller to tell apart conditions that
//! demand different handling:
//!
//! - **`TimedOut`**: a bounded poll exhausted its attempts without observing
//!   the expected value; carries the last observed value for diagnostics.
//! - **`Compile` / `CompileTimeout`**: the remote compiler reported a failure
//!   vs. never reached a terminal status in time. These are distinct on
//!   purpose - a retry decision differs between the two.
//! - **`ReadyTimeout`**: the upload was accepted but the hardware never
//!   reported ready; distinct from any compile failure.
//! - **`AcquireNotCompleted` / `AcquireBadMetadata`**: an acquisition never
//!   finished vs. finished but returned unusable data.
//! - **`Batch`**: a specific slot write failed, leaving the batch partially
//!   applied; reconciliation is the caller's responsibility.
//! - **`Configuration`**: the caller supplied an invalid bound or
//!   contradictory parameters; raised before any remote I/O.
//!
//! Compiler warnings are not errors: they travel inside a successful
//! [`CompileReport`](crate::sequencer::CompileReport). The library never
//! retries a failed step on its own - blind retry against stateful hardware
//! can itself be unsafe.

use crate::node::{NodePath, NodeValue};
use crate::store::StoreError;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type ShfResult<T> = std::result::Result<T, ShfError>;

/// Error type for all orchestration operations.
#[derive(Error, Debug)]
pub enum ShfError {
    /// Caller-supplied parameters are invalid or contradictory.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The Node Store reported a failure.
    #[error("Node store error: {0}")]
    Store(#[from] StoreError),

    /// A bounded poll exhausted its attempts without a match.
    #[error("Timed out waiting for {path} (last value {last_value:?} after {attempts} attempts)")]
    TimedOut {
        /// Node that was polled.
        path: NodePath,
        /// Last value observed before giving up, if any read succeeded.
        last_value: Option<NodeValue>,
        /// Number of read attempts made.
        attempts: u32,
    },

    /// The remote compiler reported a non-success terminal status.
    #[error("Failed to compile program for channel {channel} (status {status}): {message}")]
    Compile {
        /// Channel whose sequencer was targeted.
        channel: usize,
        /// Raw compiler status code.
        status: i64,
        /// Status message reported by the device.
        message: String,
    },

    /// The compiler never left the in-progress state within the timeout.
    #[error("Timeout during program compilation for channel {channel}: {message}")]
    CompileTimeout {
        /// Channel whose sequencer was targeted.
        channel: usize,
        /// Status message reported by the device at the time of the timeout.
        message: String,
    },

    /// Compilation succeeded but the hardware never reported ready.
    #[error("Program upload accepted but {path} never reported ready")]
    ReadyTimeout {
        /// Ready node that was polled.
        path: NodePath,
    },

    /// An acquisition never reported completion within the timeout.
    #[error("Acquisition on {path} did not complete (last value {last_value:?} after {attempts} attempts)")]
    AcquireNotCompleted {
        /// Completion flag that was polled.
        path: NodePath,
        /// Last value observed before giving up.
        last_value: Option<NodeValue>,
        /// Number of read attempts made.
        attempts: u32,
    },

    /// An acquisition finished but its result metadata was missing or malformed.
    #[error("Malformed result metadata at {path}: missing '{key}'")]
    AcquireBadMetadata {
        /// Vector node whose metadata was inspected.
        path: NodePath,
        /// Metadata key that was expected.
        key: String,
    },

    /// A clear- or fill-phase write of a batch failed; the batch is left
    /// partially applied.
    #[error("Batch write failed at slot {index}")]
    Batch {
        /// Slot index whose write failed.
        index: usize,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}
