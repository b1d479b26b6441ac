//! Scripted in-memory node store for tests.
//!
//! `MockNodeStore` plays back caller-defined value sequences for scalar reads
//! and records every operation in order, so tests can assert both what an
//! orchestrator observed and exactly which writes it issued, and in which
//! order. Writes never feed back into scripted reads: the script alone
//! defines what the "device" reports, which keeps asynchronous hardware state
//! transitions under test control.

use super::{NodeStore, StoreError};
use crate::node::{NodePath, NodeValue, VectorData, VectorRead};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One recorded store operation.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    /// Scalar read.
    Read(NodePath),
    /// Vector read.
    ReadVector(NodePath),
    /// Scalar write; `sync` marks the blocking variant.
    Write {
        /// Target node.
        path: NodePath,
        /// Written value.
        value: NodeValue,
        /// Whether the write blocked for hardware acknowledgment.
        sync: bool,
    },
    /// Vector write.
    WriteVector {
        /// Target node.
        path: NodePath,
        /// Written payload.
        data: VectorData,
    },
    /// Flush barrier.
    Flush,
}

#[derive(Default)]
struct Inner {
    scalars: HashMap<NodePath, VecDeque<NodeValue>>,
    vectors: HashMap<NodePath, VectorRead>,
    rejected: HashMap<NodePath, String>,
    log: Vec<StoreOp>,
}

/// Scripted node store double.
#[derive(Default)]
pub struct MockNodeStore {
    inner: Mutex<Inner>,
}

impl MockNodeStore {
    /// Creates an empty store; every read fails until scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts a sequence of values for scalar reads of `path`.
    ///
    /// Each read consumes one value; the final value sticks once the
    /// sequence is exhausted.
    pub fn script_scalar<I>(&self, path: impl Into<NodePath>, values: I)
    where
        I: IntoIterator,
        I::Item: Into<NodeValue>,
    {
        let values: VecDeque<NodeValue> = values.into_iter().map(Into::into).collect();
        self.lock().scalars.insert(path.into(), values);
    }

    /// Scripts a single sticky value for scalar reads of `path`.
    pub fn set_scalar(&self, path: impl Into<NodePath>, value: impl Into<NodeValue>) {
        self.script_scalar(path, [value.into()]);
    }

    /// Scripts the payload returned by vector reads of `path`.
    pub fn set_vector(&self, path: impl Into<NodePath>, data: VectorRead) {
        self.lock().vectors.insert(path.into(), data);
    }

    /// Makes every write to `path` fail with the given reason.
    pub fn reject_writes(&self, path: impl Into<NodePath>, reason: impl Into<String>) {
        self.lock().rejected.insert(path.into(), reason.into());
    }

    /// Snapshot of every recorded operation, in order.
    pub fn log(&self) -> Vec<StoreOp> {
        self.lock().log.clone()
    }

    /// Scalar and vector writes only, in order.
    pub fn writes(&self) -> Vec<StoreOp> {
        self.lock()
            .log
            .iter()
            .filter(|op| matches!(op, StoreOp::Write { .. } | StoreOp::WriteVector { .. }))
            .cloned()
            .collect()
    }

    /// Number of scalar reads issued against `path`.
    pub fn reads_of(&self, path: &NodePath) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|op| matches!(op, StoreOp::Read(p) if p == path))
            .count()
    }

    fn check_rejected(inner: &Inner, path: &NodePath) -> Result<(), StoreError> {
        if let Some(reason) = inner.rejected.get(path) {
            return Err(StoreError::Rejected {
                path: path.clone(),
                reason: reason.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MockNodeStore {
    async fn read(&self, path: &NodePath) -> Result<NodeValue, StoreError> {
        let mut inner = self.lock();
        inner.log.push(StoreOp::Read(path.clone()));
        let queue = inner
            .scalars
            .get_mut(path)
            .ok_or_else(|| StoreError::UnknownNode(path.clone()))?;
        match queue.len() {
            0 => Err(StoreError::UnknownNode(path.clone())),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().unwrap_or(NodeValue::Int(0))),
        }
    }

    async fn write(&self, path: &NodePath, value: NodeValue) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(StoreOp::Write {
            path: path.clone(),
            value,
            sync: false,
        });
        Self::check_rejected(&inner, path)
    }

    async fn sync_write(&self, path: &NodePath, value: NodeValue) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(StoreOp::Write {
            path: path.clone(),
            value,
            sync: true,
        });
        Self::check_rejected(&inner, path)
    }

    async fn write_batch(&self, settings: &[(NodePath, NodeValue)]) -> Result<(), StoreError> {
        for (path, value) in settings {
            self.write(path, value.clone()).await?;
        }
        Ok(())
    }

    async fn read_vector(&self, path: &NodePath) -> Result<VectorRead, StoreError> {
        let mut inner = self.lock();
        inner.log.push(StoreOp::ReadVector(path.clone()));
        inner
            .vectors
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::UnknownNode(path.clone()))
    }

    async fn write_vector(&self, path: &NodePath, data: VectorData) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.log.push(StoreOp::WriteVector {
            path: path.clone(),
            data,
        });
        Self::check_rejected(&inner, path)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.lock().log.push(StoreOp::Flush);
        Ok(())
    }
}
