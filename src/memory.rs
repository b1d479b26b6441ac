//! Batch writes to banks of vector memory slots.
//!
//! Waveform memories and integration-weight banks are arrays of vector nodes
//! indexed by slot. Updating a subset of slots while stale data from an older
//! generation lingers in the others corrupts measurements silently, so a
//! batch is applied with clear-then-fill discipline: the declared slot range
//! is zeroed in increasing index order before the first fill write is issued.
//! A reader observing mid-batch state then never sees a freshly written slot
//! next to one holding data from two generations back.
//!
//! There is no transactional rollback at this layer. A rejected write
//! surfaces immediately as [`ShfError::Batch`] with the failing slot index,
//! leaving the bank partially applied; reconciliation is up to the caller.

use crate::error::{ShfError, ShfResult};
use crate::node::{NodePath, VectorData};
use crate::store::NodeStore;
use log::debug;
use std::ops::RangeInclusive;

/// A bank of indexed vector-memory slots.
#[derive(Clone, Debug)]
pub struct SlotBank {
    slots: Vec<NodePath>,
}

impl SlotBank {
    /// Builds a bank of `count` slots, with `path_for` mapping a slot index
    /// to its node path.
    pub fn new(count: usize, mut path_for: impl FnMut(usize) -> NodePath) -> Self {
        Self {
            slots: (0..count).map(&mut path_for).collect(),
        }
    }

    /// Number of slots in the bank.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the bank has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Path of slot `index`, if it exists.
    pub fn path(&self, index: usize) -> Option<&NodePath> {
        self.slots.get(index)
    }

    fn checked_path(&self, index: usize) -> ShfResult<&NodePath> {
        self.slots.get(index).ok_or_else(|| {
            ShfError::Configuration(format!(
                "slot index {index} out of range for bank of {}",
                self.slots.len()
            ))
        })
    }

    /// Applies a batch to the bank: an optional clear phase followed by the
    /// caller's fill writes.
    ///
    /// If `clear_range` is given, the defined empty value is written to every
    /// slot in the range in increasing index order, and that phase completes
    /// before any fill write is issued. Fills are applied in caller order, so
    /// later entries for the same slot win. An empty fill set without a clear
    /// range is rejected as contradictory before any write.
    pub async fn apply(
        &self,
        store: &dyn NodeStore,
        clear_range: Option<RangeInclusive<usize>>,
        fills: &[(usize, VectorData)],
    ) -> ShfResult<()> {
        if fills.is_empty() && clear_range.is_none() {
            return Err(ShfError::Configuration(
                "batch has neither a clear range nor fill writes".to_string(),
            ));
        }

        if let Some(range) = clear_range {
            // validate the whole range up front so a bad bound cannot abort
            // the clear phase halfway through
            self.checked_path(*range.end())?;
            for index in range {
                let path = self.checked_path(index)?;
                store
                    .write_vector(path, VectorData::empty())
                    .await
                    .map_err(|source| ShfError::Batch { index, source })?;
            }
        }

        for (index, data) in fills {
            let path = self.checked_path(*index)?;
            store
                .write_vector(path, data.clone())
                .await
                .map_err(|source| ShfError::Batch {
                    index: *index,
                    source,
                })?;
        }

        debug!("applied batch of {} fill write(s)", fills.len());
        Ok(())
    }
}
