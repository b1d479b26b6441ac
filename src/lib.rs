//! Client-side orchestration for SHF-class quantum measurement instruments.
//!
//! The instrument is a remote, stateful device whose internal state
//! transitions asynchronously and is observed only by polling nodes in its
//! key/value tree. This library supplies the synchronization discipline that
//! turns sequences of node writes, a remote compilation step, and hardware
//! trigger/acquire cycles into reliable, bounded-time protocols:
//!
//! - [`poll`]: the bounded state-wait primitive every orchestrator builds on.
//! - [`sequencer`]: compile-and-load of sequencer programs
//!   (reset, submit, poll compiler, await hardware-ready).
//! - [`scope`] and [`results`]: arm-trigger-poll-read acquisition for the
//!   waveform scope and the per-channel result loggers.
//! - [`memory`]: clear-then-fill batch writes to waveform and weight banks.
//! - [`store`]: the abstract Node Store the protocols run against, plus a
//!   scripted mock for tests.
//!
//! The node tree itself (transport, session handling) is an external
//! collaborator; everything here is correct regardless of how the store is
//! implemented. Every wait is bounded - on timeout the affected resource's
//! state is reported in the error and retry decisions are left to the caller.

pub mod device;
pub mod error;
pub mod memory;
pub mod node;
pub mod poll;
pub mod results;
pub mod scope;
pub mod sequencer;
pub mod store;

pub use error::{ShfError, ShfResult};
pub use node::{NodePath, NodeValue, VectorData, VectorRead};
pub use poll::{wait_for_value, PollBound, PollSpec};
pub use store::{NodeStore, StoreError};
