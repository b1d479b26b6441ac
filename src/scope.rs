//! Scope capture orchestration: arm, trigger, poll completion, read.
//!
//! The scope is a shared device resource with four input channels. A capture
//! runs as one protocol: apply the capture configuration as a single batch,
//! arm the scope (disabling it first if a previous run left it armed), issue
//! software triggers if no external trigger drives it, then poll the enable
//! flag until it clears - that flag, not any sample count, is the
//! authoritative completion signal - and finally read the wave vector of
//! every enabled channel together with its physical scale.

use crate::device::{DeviceProfile, ADC_BITS};
use crate::error::{ShfError, ShfResult};
use crate::node::{NodePath, NodeValue};
use crate::poll::{wait_for_value, PollSpec, DEFAULT_POLL_INTERVAL};
use crate::store::NodeStore;
use log::{debug, info};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Number of scope input channels.
pub const SCOPE_CHANNEL_COUNT: usize = 4;

/// Floor on the delay between consecutive software triggers.
///
/// The blocking trigger write itself takes a non-deterministic,
/// device-dependent time; a shorter caller-requested delay is raised to this
/// floor rather than honored.
pub const MIN_SW_TRIGGER_INTERVAL: Duration = Duration::from_millis(20);

/// Capture configuration for one scope run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Maps a scope channel to its signal source alias
    /// (e.g. `"channel0_signal_input"`). Channels not listed stay disabled.
    pub input_select: BTreeMap<usize, String>,
    /// Number of samples per captured segment.
    pub num_samples: usize,
    /// Trigger source alias; `None` selects self-triggering.
    pub trigger_input: Option<String>,
    /// Number of distinct segments per acquisition.
    pub num_segments: usize,
    /// Hardware averages per segment; an acquisition completes once
    /// `num_segments * num_averages` triggers have been received.
    pub num_averages: usize,
    /// Delay in samples between acquisition start and trigger reception.
    pub trigger_delay: i64,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            input_select: BTreeMap::new(),
            num_samples: 0,
            trigger_input: None,
            num_segments: 1,
            num_averages: 1,
            trigger_delay: 0,
        }
    }
}

/// A bounded software-trigger sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwTriggerConfig {
    /// Number of triggers to issue.
    pub num_triggers: usize,
    /// Requested delay between triggers; floored to
    /// [`MIN_SW_TRIGGER_INTERVAL`].
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Samples and scale of one captured channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelCapture {
    /// Scope channel index.
    pub channel: usize,
    /// Captured samples.
    pub samples: Vec<Complex64>,
    /// Full-scale range in volts, derived from the wave metadata.
    pub full_scale_range: f64,
    /// Acquisition time of each sample in seconds, starting from 0.
    pub time_axis: Vec<f64>,
}

/// Result of one scope capture: the enabled channels, in index order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CaptureResult {
    /// One entry per enabled channel.
    pub channels: Vec<ChannelCapture>,
}

/// Orchestrator for one scope resource.
pub struct Scope<'a> {
    store: &'a dyn NodeStore,
    profile: DeviceProfile,
    index: usize,
    root: NodePath,
}

impl<'a> Scope<'a> {
    /// Binds scope `index` of a device to a store session.
    pub fn new(store: &'a dyn NodeStore, profile: &DeviceProfile, index: usize) -> Self {
        Self {
            store,
            root: profile.scope(index),
            profile: profile.clone(),
            index,
        }
    }

    fn enable_node(&self) -> NodePath {
        self.root.join("enable")
    }

    fn channel_node(&self, channel: usize, leaf: &str) -> NodePath {
        self.root.join("channels").join(channel.to_string()).join(leaf)
    }

    /// Applies the capture configuration as one batch of writes.
    ///
    /// All channel enables are cleared first within the batch, so a channel
    /// enabled by an earlier run never stays live into this one.
    pub async fn configure(&self, config: &ScopeConfig) -> ShfResult<()> {
        for &channel in config.input_select.keys() {
            if channel >= SCOPE_CHANNEL_COUNT {
                return Err(ShfError::Configuration(format!(
                    "scope channel {channel} out of range 0..{SCOPE_CHANNEL_COUNT}"
                )));
            }
        }
        if config.num_samples == 0 {
            return Err(ShfError::Configuration(
                "scope capture length must be positive".to_string(),
            ));
        }

        let mut settings: Vec<(NodePath, NodeValue)> = Vec::new();
        settings.push((
            self.root.join("segments/count"),
            NodeValue::Int(config.num_segments as i64),
        ));
        settings.push((
            self.root.join("segments/enable"),
            NodeValue::Int(i64::from(config.num_segments > 1)),
        ));
        settings.push((
            self.root.join("averaging/enable"),
            NodeValue::Int(i64::from(config.num_averages > 1)),
        ));
        settings.push((
            self.root.join("averaging/count"),
            NodeValue::Int(config.num_averages as i64),
        ));

        for channel in 0..SCOPE_CHANNEL_COUNT {
            settings.push((self.channel_node(channel, "enable"), NodeValue::Int(0)));
        }
        for (&channel, source) in &config.input_select {
            settings.push((
                self.channel_node(channel, "inputselect"),
                NodeValue::Str(source.clone()),
            ));
            settings.push((self.channel_node(channel, "enable"), NodeValue::Int(1)));
        }

        settings.push((
            self.root.join("trigger/delay"),
            NodeValue::Int(config.trigger_delay),
        ));
        match &config.trigger_input {
            Some(source) => {
                settings.push((
                    self.root.join("trigger/channel"),
                    NodeValue::Str(source.clone()),
                ));
                settings.push((self.root.join("trigger/enable"), NodeValue::Int(1)));
            }
            None => {
                settings.push((self.root.join("trigger/enable"), NodeValue::Int(0)));
            }
        }
        settings.push((
            self.root.join("length"),
            NodeValue::Int(config.num_samples as i64),
        ));

        self.store.write_batch(&settings).await?;
        debug!(
            "scope {} configured for {} channel(s)",
            self.index,
            config.input_select.len()
        );
        Ok(())
    }

    /// Arms the scope.
    ///
    /// If the enable flag still reads nonzero from a previous run the scope
    /// is disabled first and the disable observed before re-enabling;
    /// re-arming an armed scope is undefined on real hardware. Both
    /// transitions are bounded by `timeout`.
    pub async fn arm(&self, single: bool, timeout: Duration) -> ShfResult<()> {
        let enable = self.enable_node();
        let spec = PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout);

        self.store
            .write(&self.root.join("single"), NodeValue::Int(i64::from(single)))
            .await?;

        if self.store.read_int(&enable).await? != 0 {
            self.store.sync_write(&enable, NodeValue::Int(0)).await?;
            wait_for_value(self.store, &enable, &NodeValue::Int(0), &spec).await?;
        }
        self.store.sync_write(&enable, NodeValue::Int(1)).await?;
        wait_for_value(self.store, &enable, &NodeValue::Int(1), &spec).await?;
        debug!("scope {} armed", self.index);
        Ok(())
    }

    /// Issues a bounded sequence of software triggers.
    ///
    /// Each trigger is a blocking write followed by the configured delay
    /// (floored to [`MIN_SW_TRIGGER_INTERVAL`]). The device is guaranteed to
    /// receive and process every trigger; the spacing between them is
    /// non-deterministic by nature of software triggering, so this is for
    /// prototyping and setups without strong timing requirements.
    pub async fn software_trigger(&self, config: &SwTriggerConfig) -> ShfResult<()> {
        let interval = config.interval.max(MIN_SW_TRIGGER_INTERVAL);
        let trigger = self.profile.sw_trigger(0);
        for _ in 0..config.num_triggers {
            self.store.sync_write(&trigger, NodeValue::Int(1)).await?;
            tokio::time::sleep(interval).await;
        }
        debug!("issued {} software trigger(s)", config.num_triggers);
        Ok(())
    }

    /// Waits for the capture to finish and reads the enabled channels.
    ///
    /// A completion timeout surfaces as
    /// [`ShfError::AcquireNotCompleted`]; a channel whose wave lacks the
    /// `scaling` or `averagecount` metadata surfaces as
    /// [`ShfError::AcquireBadMetadata`] - the two are distinct so callers can
    /// tell "never finished" from "finished but unusable".
    pub async fn read(&self, timeout: Duration) -> ShfResult<CaptureResult> {
        let enable = self.enable_node();
        wait_for_value(
            self.store,
            &enable,
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

        // barrier: make sure the capture's writes are applied before reading
        self.store.flush().await?;

        let decimation_exponent = self.store.read_int(&self.root.join("time")).await?;
        let decimation = 2f64.powi(i32::try_from(decimation_exponent).unwrap_or(0));
        let sampling_rate = self.profile.sampling_frequency / decimation;
        let full_scale_lsb = f64::from(1u32 << (ADC_BITS - 1));

        let mut result = CaptureResult::default();
        for channel in 0..SCOPE_CHANNEL_COUNT {
            if self.store.read_int(&self.channel_node(channel, "enable")).await? != 1 {
                continue;
            }
            let wave_node = self.channel_node(channel, "wave");
            let wave = self.store.read_vector(&wave_node).await?;
            let scaling = Self::required_metadata(&wave_node, &wave.properties, "scaling")?;
            let average_count =
                Self::required_metadata(&wave_node, &wave.properties, "averagecount")?;

            // one LSB covers `scaling * averagecount` volts after averaging
            let full_scale_range = scaling * average_count * full_scale_lsb;
            let time_axis = (0..wave.samples.len())
                .map(|i| i as f64 / sampling_rate)
                .collect();
            result.channels.push(ChannelCapture {
                channel,
                samples: wave.samples,
                full_scale_range,
                time_axis,
            });
        }

        info!(
            "scope {} capture read: {} channel(s)",
            self.index,
            result.channels.len()
        );
        Ok(result)
    }

    fn required_metadata(
        path: &NodePath,
        properties: &std::collections::HashMap<String, f64>,
        key: &str,
    ) -> ShfResult<f64> {
        properties
            .get(key)
            .copied()
            .ok_or_else(|| ShfError::AcquireBadMetadata {
                path: path.clone(),
                key: key.to_string(),
            })
    }

    /// Runs one full capture: configure, arm, trigger, read.
    ///
    /// `sw_trigger` is `None` when an external event drives completion.
    pub async fn acquire(
        &self,
        config: &ScopeConfig,
        sw_trigger: Option<&SwTriggerConfig>,
        timeout: Duration,
    ) -> ShfResult<CaptureResult> {
        self.configure(config).await?;
        self.arm(true, timeout).await?;
        if let Some(trigger) = sw_trigger {
            self.software_trigger(trigger).await?;
        }
        self.read(timeout).await
    }
}
