//! Node Store boundary.
//!
//! The store is the only shared mutable resource the orchestrators touch: a
//! key/value interface over the device's node tree, with a flush barrier and
//! a blocking-write variant used wherever a precondition write must be
//! confirmed applied before a subsequent poll begins. The transport behind it
//! (network session, simulator, test double) is out of scope here.
//!
//! Implementations must tolerate concurrent reads and writes to disjoint
//! paths; the orchestrators never serialize unrelated resources themselves.

pub mod mock;

pub use mock::MockNodeStore;

use crate::node::{NodePath, NodeValue, VectorData, VectorRead};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a Node Store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The path does not address any node on the device.
    #[error("Unknown node: {0}")]
    UnknownNode(NodePath),

    /// The device rejected a written value.
    #[error("Write to {path} rejected: {reason}")]
    Rejected {
        /// Node the write targeted.
        path: NodePath,
        /// Device-reported reason.
        reason: String,
    },

    /// The node holds a different value type than the caller expected.
    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Node that was read.
        path: NodePath,
        /// Expected value variant.
        expected: &'static str,
        /// Observed value variant.
        actual: &'static str,
    },

    /// The underlying transport failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Key/value interface to the device node tree.
///
/// All methods take `&self` so independent orchestrations against disjoint
/// resources can share one session concurrently.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Reads the scalar value at `path`.
    async fn read(&self, path: &NodePath) -> Result<NodeValue, StoreError>;

    /// Writes a scalar value to `path`.
    async fn write(&self, path: &NodePath, value: NodeValue) -> Result<(), StoreError>;

    /// Writes a scalar value and blocks until the hardware acknowledges it.
    ///
    /// Used for every write that establishes a precondition (reset, arm,
    /// software trigger): once this returns, a subsequent poll cannot observe
    /// a state predating the write.
    async fn sync_write(&self, path: &NodePath, value: NodeValue) -> Result<(), StoreError>;

    /// Applies several scalar writes in one transfer, in the given order.
    async fn write_batch(&self, settings: &[(NodePath, NodeValue)]) -> Result<(), StoreError>;

    /// Reads the vector value at `path`, with its metadata.
    async fn read_vector(&self, path: &NodePath) -> Result<VectorRead, StoreError>;

    /// Writes a vector value to `path`.
    async fn write_vector(&self, path: &NodePath, data: VectorData) -> Result<(), StoreError>;

    /// Barrier: previously issued writes are applied remotely before this
    /// returns.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Reads `path` and requires an integer node.
    async fn read_int(&self, path: &NodePath) -> Result<i64, StoreError> {
        match self.read(path).await? {
            NodeValue::Int(v) => Ok(v),
            other => Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: "Int",
                actual: other.type_name(),
            }),
        }
    }

    /// Reads `path` and requires a string node.
    async fn read_string(&self, path: &NodePath) -> Result<String, StoreError> {
        match self.read(path).await? {
            NodeValue::Str(v) => Ok(v),
            other => Err(StoreError::TypeMismatch {
                path: path.clone(),
                expected: "Str",
                actual: other.type_name(),
            }),
        }
    }
}
