//! Compile-and-load orchestration for sequencer programs.
//!
//! Loading a program is a multi-step protocol against asynchronous device
//! state: reset the sequencer, submit the source text, poll the remote
//! compiler until it reaches a terminal status, then wait for the hardware to
//! report ready. Each phase is bounded by the caller's timeout, and each
//! failure mode maps to a distinct [`ShfError`](crate::error::ShfError)
//! variant so callers can tell a compile failure from a compile timeout from
//! an upload that never became ready.

use crate::device::{
    ChannelKind, DeviceProfile, SHFQA_MAX_GENERATOR_CARRIER_COUNT,
    SHFQA_MAX_GENERATOR_WAVEFORM_LENGTH, SHFSG_GENERATOR_WAVEFORM_SLOT_COUNT,
    SHFSG_MAX_GENERATOR_WAVEFORM_LENGTH,
};
use crate::error::{ShfError, ShfResult};
use crate::memory::SlotBank;
use crate::node::{NodePath, NodeValue, VectorData};
use crate::poll::{wait_for_value, PollSpec, DEFAULT_POLL_INTERVAL};
use crate::store::NodeStore;
use log::{debug, info, warn};
use num_complex::Complex64;
use std::time::Duration;
use tokio::time::Instant;

/// Compiler status sentinel: compilation still in progress.
pub const COMPILER_STATUS_IN_PROGRESS: i64 = -1;
/// Compiler status: success.
pub const COMPILER_STATUS_SUCCESS: i64 = 0;
/// Compiler status: success with warnings.
pub const COMPILER_STATUS_WARNING: i64 = 2;

/// Interval between compiler-status polls.
pub const COMPILE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Node paths and profile flags for one sequencer target.
///
/// Device-generation differences are profile flags on this struct, not
/// separate code paths: QA and SG channels share one load protocol and
/// differ only in path layout and whether the ready node must be observed
/// low after a reset.
#[derive(Clone, Debug)]
pub struct SequencerTarget {
    /// Channel this sequencer belongs to.
    pub channel_index: usize,
    /// Whether the ready node must drop to 0 after a reset before
    /// compilation may start.
    pub await_reset_low: bool,
    /// Maximum waveform length a memory slot accepts, in samples.
    pub max_waveform_length: usize,
    base: NodePath,
    command_table: Option<NodePath>,
    waveforms: SlotBank,
}

impl SequencerTarget {
    /// Target for the generator of a QA channel.
    pub fn qa(profile: &DeviceProfile, channel_index: usize) -> Self {
        let base = profile.channel(ChannelKind::Qa, channel_index).join("generator");
        let wave_base = base.join("waveforms");
        Self {
            channel_index,
            await_reset_low: true,
            max_waveform_length: SHFQA_MAX_GENERATOR_WAVEFORM_LENGTH,
            command_table: None,
            waveforms: SlotBank::new(SHFQA_MAX_GENERATOR_CARRIER_COUNT, |i| {
                wave_base.join(i.to_string()).join("wave")
            }),
            base,
        }
    }

    /// Target for the AWG core of an SG channel.
    pub fn sg(profile: &DeviceProfile, channel_index: usize) -> Self {
        let base = profile.channel(ChannelKind::Sg, channel_index).join("awg");
        let wave_base = base.join("waveform/waves");
        Self {
            channel_index,
            await_reset_low: true,
            max_waveform_length: SHFSG_MAX_GENERATOR_WAVEFORM_LENGTH,
            command_table: Some(base.join("commandtable/data")),
            waveforms: SlotBank::new(SHFSG_GENERATOR_WAVEFORM_SLOT_COUNT, |i| {
                wave_base.join(i.to_string())
            }),
            base,
        }
    }

    /// Reset node.
    pub fn reset(&self) -> NodePath {
        self.base.join("reset")
    }

    /// Ready node.
    pub fn ready(&self) -> NodePath {
        self.base.join("ready")
    }

    /// Enable node.
    pub fn enable(&self) -> NodePath {
        self.base.join("enable")
    }

    /// Single-shot mode node.
    pub fn single(&self) -> NodePath {
        self.base.join("single")
    }

    /// Compiler source-text node.
    pub fn compiler_source(&self) -> NodePath {
        self.base.join("compiler/sourcestring")
    }

    /// Compiler status node.
    pub fn compiler_status(&self) -> NodePath {
        self.base.join("compiler/status")
    }

    /// Compiler status-message node.
    pub fn compiler_status_message(&self) -> NodePath {
        self.base.join("compiler/statusstring")
    }

    /// Waveform memory bank of this sequencer.
    pub fn waveforms(&self) -> &SlotBank {
        &self.waveforms
    }
}

/// Terminal compile state of a successful load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Compiler reported success.
    Success,
    /// Compiler reported success with a warning; the message is informational
    /// and the program was loaded.
    Warning(String),
}

/// Report returned by a successful [`Sequencer::load_program`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileReport {
    /// Channel whose sequencer was loaded.
    pub channel: usize,
    /// Terminal compile state.
    pub outcome: CompileOutcome,
}

/// Orchestrator for one sequencer.
pub struct Sequencer<'a> {
    store: &'a dyn NodeStore,
    target: SequencerTarget,
}

impl<'a> Sequencer<'a> {
    /// Binds a sequencer target to a store session.
    pub fn new(store: &'a dyn NodeStore, target: SequencerTarget) -> Self {
        Self { store, target }
    }

    /// The bound target.
    pub fn target(&self) -> &SequencerTarget {
        &self.target
    }

    /// Compiles and loads a program, optionally followed by a command table.
    ///
    /// Protocol: reset the sequencer (blocking write, so the reset is applied
    /// before anything else), wait for the ready node to drop if the target
    /// requires it, submit the source, poll the compiler status every
    /// [`COMPILE_POLL_INTERVAL`] until it leaves the in-progress sentinel or
    /// `timeout` elapses, then wait for the ready node to report 1 within
    /// `timeout`. A command table, if supplied, is uploaded only after the
    /// program is loaded; the hardware discards blobs written during
    /// reset or compilation.
    ///
    /// A compiler warning (status 2) does not fail the call; it is logged and
    /// returned in the report.
    pub async fn load_program(
        &self,
        source: &str,
        timeout: Duration,
        command_table: Option<&str>,
    ) -> ShfResult<CompileReport> {
        let target = &self.target;
        let channel = target.channel_index;

        self.store
            .sync_write(&target.reset(), NodeValue::Int(1))
            .await?;
        if target.await_reset_low {
            wait_for_value(
                self.store,
                &target.ready(),
                &NodeValue::Int(0),
                &PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout),
            )
            .await?;
        }

        debug!("submitting program to sequencer of channel {channel}");
        self.store
            .write(&target.compiler_source(), NodeValue::Str(source.to_string()))
            .await?;

        // The terminal condition here is "status left the in-progress
        // sentinel", not equality with one value, so this poll is bespoke and
        // keeps a wall-clock deadline.
        let started = Instant::now();
        let status_node = target.compiler_status();
        let mut status = self.store.read_int(&status_node).await?;
        let mut timed_out = false;
        while status == COMPILER_STATUS_IN_PROGRESS {
            if started.elapsed() > timeout {
                timed_out = true;
                break;
            }
            tokio::time::sleep(COMPILE_POLL_INTERVAL).await;
            status = self.store.read_int(&status_node).await?;
        }

        let outcome = if timed_out || status != COMPILER_STATUS_SUCCESS {
            // re-query: the status may have settled while we were deciding
            let status = self.store.read_int(&status_node).await?;
            let message = self
                .store
                .read_string(&target.compiler_status_message())
                .await?;
            if status == COMPILER_STATUS_WARNING {
                warn!("Compiler warning for channel {channel}: {message}");
                CompileOutcome::Warning(message)
            } else if timed_out {
                return Err(ShfError::CompileTimeout { channel, message });
            } else {
                return Err(ShfError::Compile {
                    channel,
                    status,
                    message,
                });
            }
        } else {
            CompileOutcome::Success
        };

        // upload accepted; wait for the hardware to come back ready
        wait_for_value(
            self.store,
            &target.ready(),
            &NodeValue::Int(1),
            &PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout),
        )
        .await
        .map_err(|err| match err {
            ShfError::TimedOut { path, .. } => ShfError::ReadyTimeout { path },
            other => other,
        })?;

        if let Some(table) = command_table {
            let path = target.command_table.as_ref().ok_or_else(|| {
                ShfError::Configuration(format!(
                    "channel {channel} sequencer has no command table"
                ))
            })?;
            self.store
                .write_vector(path, VectorData::Text(table.to_string()))
                .await?;
            debug!("command table uploaded to channel {channel}");
        }

        info!("program loaded on sequencer of channel {channel}");
        Ok(CompileReport { channel, outcome })
    }

    /// Starts the sequencer.
    ///
    /// With `single` set the sequencer disables itself after one execution;
    /// otherwise it restarts. The enable write blocks for acknowledgment and
    /// the enable node is then polled until it reads 1 within `timeout`.
    pub async fn enable(&self, single: bool, timeout: Duration) -> ShfResult<()> {
        let target = &self.target;
        self.store
            .write(&target.single(), NodeValue::Int(i64::from(single)))
            .await?;
        self.store
            .sync_write(&target.enable(), NodeValue::Int(1))
            .await?;
        wait_for_value(
            self.store,
            &target.enable(),
            &NodeValue::Int(1),
            &PollSpec::deadline(DEFAULT_POLL_INTERVAL, timeout),
        )
        .await?;
        info!("sequencer of channel {} enabled", target.channel_index);
        Ok(())
    }

    /// Writes waveforms to the sequencer's memory bank.
    ///
    /// With `clear_existing` the full bank is zeroed before the upload, so no
    /// stale waveform from an earlier program survives next to the new set.
    /// A waveform longer than the target's memory slot is rejected before
    /// any write.
    pub async fn write_waveforms(
        &self,
        waveforms: &[(usize, Vec<Complex64>)],
        clear_existing: bool,
    ) -> ShfResult<()> {
        for (slot, samples) in waveforms {
            if samples.len() > self.target.max_waveform_length {
                return Err(ShfError::Configuration(format!(
                    "waveform for slot {slot} is {} samples long, limit is {}",
                    samples.len(),
                    self.target.max_waveform_length
                )));
            }
        }
        let bank = self.target.waveforms();
        let clear_range = if clear_existing && !bank.is_empty() {
            Some(0..=bank.len() - 1)
        } else {
            None
        };
        let fills: Vec<(usize, VectorData)> = waveforms
            .iter()
            .map(|(slot, samples)| (*slot, VectorData::Complex(samples.clone())))
            .collect();
        bank.apply(self.store, clear_range, &fills).await
    }
}
