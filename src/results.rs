//! Result-logger orchestration: configure, arm, poll completion, read.
//!
//! Each QA channel carries one result logger that accumulates measurement
//! outcomes on the device. The acquisition protocol mirrors the scope: apply
//! the configuration as one batch, arm with disable-then-enable discipline,
//! wait for the enable flag to clear, then read the accumulated vectors.

use crate::device::{ChannelKind, DeviceProfile, SHFQA_MAX_GENERATOR_CARRIER_COUNT};
use crate::error::{ShfError, ShfResult};
use crate::memory::SlotBank;
use crate::node::{NodePath, NodeValue, VectorData};
use crate::poll::{wait_for_value, PollSpec, DEFAULT_POLL_INTERVAL};
use crate::store::NodeStore;
use log::{debug, info};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Acquisition mode of a result logger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMode {
    /// Spectroscopy mode.
    Spectroscopy,
    /// Readout mode, with the named result source
    /// (e.g. `"result_of_integration"`).
    Readout {
        /// Result source alias.
        source: String,
    },
}

impl ResultMode {
    fn segment(&self) -> &'static str {
        match self {
            ResultMode::Spectroscopy => "spectroscopy",
            ResultMode::Readout { .. } => "readout",
        }
    }
}

/// Averaging order of accumulated results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingMode {
    /// Cyclic averaging.
    Cyclic,
    /// Sequential averaging.
    Sequential,
}

impl AveragingMode {
    fn code(self) -> i64 {
        match self {
            AveragingMode::Cyclic => 0,
            AveragingMode::Sequential => 1,
        }
    }
}

/// Configuration of one result-logger run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultLoggerConfig {
    /// Number of results to accumulate.
    pub result_length: usize,
    /// Number of hardware averages.
    pub num_averages: usize,
    /// Averaging order.
    pub averaging_mode: AveragingMode,
}

/// Orchestrator for the result logger of one QA channel.
pub struct ResultLogger<'a> {
    store: &'a dyn NodeStore,
    channel_index: usize,
    mode: ResultMode,
    root: NodePath,
}

impl<'a> ResultLogger<'a> {
    /// Binds the result logger of `channel_index` in the given mode.
    pub fn new(
        store: &'a dyn NodeStore,
        profile: &DeviceProfile,
        channel_index: usize,
        mode: ResultMode,
    ) -> Self {
        let root = profile
            .channel(ChannelKind::Qa, channel_index)
            .join(mode.segment())
            .join("result");
        Self {
            store,
            channel_index,
            mode,
            root,
        }
    }

    fn enable_node(&self) -> NodePath {
        self.root.join("enable")
    }

    /// Applies the logger configuration as one batch of writes.
    pub async fn configure(&self, config: &ResultLoggerConfig) -> ShfResult<()> {
        if config.result_length == 0 {
            return Err(ShfError::Configuration(
                "result length must be positive".to_string(),
            ));
        }

        let mut settings: Vec<(NodePath, NodeValue)> = vec![
            (
                self.root.join("length"),
                NodeValue::Int(config.result_length as i64),
            ),
            (
                self.root.join("averages"),
                NodeValue::Int(config.num_averages as i64),
            ),
            (
                self.root.join("mode"),
                NodeValue::Int(config.averaging_mode.code()),
            ),
        ];
        if let ResultMode::Readout { source } = &self.mode {
            settings.push((self.root.join("source"), NodeValue::Str(source.clone())));
        }

        self.store.write_batch(&settings).await?;
        debug!(
            "result logger of channel {} configured for {} result(s)",
            self.channel_index, config.result_length
        );
        Ok(())
    }

    /// Resets and enables the result logger.
    ///
    /// If an old measurement is still running the logger is disabled first
    /// and the disable observed before re-enabling.
    pub async fn arm(&self, timeout: Duration) -> ShfResult<()> {
        let enable = self.enable_node();
        let spec = PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout);

        if self.store.read_int(&enable).await? != 0 {
            self.store.sync_write(&enable, NodeValue::Int(0)).await?;
            wait_for_value(self.store, &enable, &NodeValue::Int(0), &spec).await?;
        }
        self.store.sync_write(&enable, NodeValue::Int(1)).await?;
        wait_for_value(self.store, &enable, &NodeValue::Int(1), &spec).await?;
        debug!("result logger of channel {} armed", self.channel_index);
        Ok(())
    }

    /// Waits until the logger is finished and reads the accumulated vectors
    /// of result units `0..num_units`.
    ///
    /// A completion timeout surfaces as [`ShfError::AcquireNotCompleted`].
    pub async fn read(
        &self,
        num_units: usize,
        timeout: Duration,
    ) -> ShfResult<Vec<Vec<Complex64>>> {
        wait_for_value(
            self.store,
            &self.enable_node(),
            &NodeValue::Int(0),
            &PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout),
        )
        .await
        .map_err(|err| match err {
            ShfError::TimedOut {
                path,
                last_value,
                attempts,
            } => ShfError::AcquireNotCompleted {
                path,
                last_value,
                attempts,
            },
            other => other,
        })?;

        self.store.flush().await?;

        let mut results = Vec::with_capacity(num_units);
        for unit in 0..num_units {
            let path = self.root.join("data").join(unit.to_string()).join("wave");
            let read = self.store.read_vector(&path).await?;
            results.push(read.samples);
        }

        info!(
            "result logger of channel {} read: {} unit(s)",
            self.channel_index, num_units
        );
        Ok(results)
    }
}

/// Configures the weighted integration of a QA channel.
///
/// The full weight bank is zeroed before the upload, then the supplied
/// complex weight vectors are written to their integration units and the
/// integration length and delay applied. An empty weight set is rejected.
pub async fn configure_weighted_integration(
    store: &dyn NodeStore,
    profile: &DeviceProfile,
    channel_index: usize,
    weights: &BTreeMap<usize, Vec<Complex64>>,
    integration_delay: f64,
) -> ShfResult<()> {
    let first = weights
        .values()
        .next()
        .ok_or_else(|| ShfError::Configuration("integration weights cannot be empty".to_string()))?;
    let integration_length = first.len();

    let base = profile
        .channel(ChannelKind::Qa, channel_index)
        .join("readout/integration");
    let weight_base = base.join("weights");
    let bank = SlotBank::new(SHFQA_MAX_GENERATOR_CARRIER_COUNT, |i| {
        weight_base.join(i.to_string()).join("wave")
    });

    let fills: Vec<(usize, VectorData)> = weights
        .iter()
        .map(|(unit, weight)| (*unit, VectorData::Complex(weight.clone())))
        .collect();
    bank.apply(store, Some(0..=bank.len() - 1), &fills).await?;

    store
        .write_batch(&[
            (base.join("length"), NodeValue::Int(integration_length as i64)),
            (base.join("delay"), NodeValue::Double(integration_delay)),
        ])
        .await?;

    debug!(
        "weighted integration configured on channel {channel_index} for {} unit(s)",
        weights.len()
    );
    Ok(())
}
