//! Bounded polling of device nodes.
//!
//! The device's internal state transitions asynchronously and is observed
//! only by reading nodes, so every "wait until" in the orchestration layer
//! funnels through [`wait_for_value`]: read a node repeatedly until it equals
//! an expected value or a bound expires. There is no unbounded wait anywhere
//! in this library; an unbounded poll is a programming error and is rejected
//! before the first read.

use crate::error::{ShfError, ShfResult};
use crate::node::{NodePath, NodeValue};
use crate::store::NodeStore;
use log::{debug, trace};
use std::time::Duration;

/// Poll interval used by the orchestrators for state-change waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bound on a poll: either a maximum attempt count or a wall-clock budget.
///
/// Attempts are the canonical representation. A deadline is converted with
/// `attempts = ceil(deadline / interval)` (at least 1), so a deadline-bounded
/// poll rounds up to whole intervals: a 95 ms deadline at a 10 ms interval
/// allows 10 attempts, not 9.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollBound {
    /// At most this many read attempts.
    Attempts(u32),
    /// Attempts derived from this duration and the poll interval.
    Deadline(Duration),
}

/// A fully specified poll: how often to read, and when to give up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSpec {
    /// Delay between consecutive read attempts. Must be positive.
    pub interval: Duration,
    /// Bound on the wait.
    pub bound: PollBound,
}

impl PollSpec {
    /// Poll every `interval`, at most `attempts` times.
    pub fn attempts(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            bound: PollBound::Attempts(attempts),
        }
    }

    /// Poll every `interval` until roughly `deadline` has elapsed.
    pub fn deadline(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            bound: PollBound::Deadline(deadline),
        }
    }

    /// Resolves the bound to a concrete attempt count, validating the spec.
    pub fn max_attempts(&self) -> ShfResult<u32> {
        if self.interval.is_zero() {
            return Err(ShfError::Configuration(
                "poll interval must be positive".to_string(),
            ));
        }
        match self.bound {
            PollBound::Attempts(0) => Err(ShfError::Configuration(
                "poll bound must allow at least one attempt".to_string(),
            )),
            PollBound::Attempts(n) => Ok(n),
            PollBound::Deadline(deadline) => {
                let interval = self.interval.as_nanos();
                let attempts = deadline.as_nanos().div_ceil(interval).max(1);
                Ok(u32::try_from(attempts).unwrap_or(u32::MAX))
            }
        }
    }
}

/// Polls `path` until it equals `expected` or the bound is exhausted.
///
/// The first read happens immediately and counts against the bound; a match
/// on any read returns without a further sleep, and no sleep follows the
/// final failed attempt. Each attempt issues exactly one remote read and no
/// writes. On failure the returned [`ShfError::TimedOut`] carries the last
/// observed value and the number of attempts made.
pub async fn wait_for_value(
    store: &dyn NodeStore,
    path: &NodePath,
    expected: &NodeValue,
    spec: &PollSpec,
) -> ShfResult<()> {
    let max_attempts = spec.max_attempts()?;
    let mut last_value = None;

    for attempt in 1..=max_attempts {
        let value = store.read(path).await?;
        if &value == expected {
            trace!("{path} reached {expected} after {attempt} attempt(s)");
            return Ok(());
        }
        last_value = Some(value);
        if attempt < max_attempts {
            tokio::time::sleep(spec.interval).await;
        }
    }

    debug!("{path} never reached {expected} within {max_attempts} attempt(s)");
    Err(ShfError::TimedOut {
        path: path.clone(),
        last_value,
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockNodeStore;
    use tokio::time::Instant;

    fn path() -> NodePath {
        NodePath::new("/dev1/qachannels/0/generator/ready")
    }

    #[test]
    fn test_deadline_rounds_up_to_whole_intervals() {
        let spec = PollSpec::deadline(Duration::from_millis(10), Duration::from_millis(95));
        assert_eq!(spec.max_attempts().unwrap(), 10);

        let exact = PollSpec::deadline(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(exact.max_attempts().unwrap(), 10);

        let sub_interval = PollSpec::deadline(Duration::from_millis(100), Duration::from_millis(1));
        assert_eq!(sub_interval.max_attempts().unwrap(), 1);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let zero_interval = PollSpec::attempts(Duration::ZERO, 5);
        assert!(matches!(
            zero_interval.max_attempts(),
            Err(ShfError::Configuration(_))
        ));

        let zero_attempts = PollSpec::attempts(Duration::from_millis(10), 0);
        assert!(matches!(
            zero_attempts.max_attempts(),
            Err(ShfError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_match_reads_once_and_never_sleeps() {
        let store = MockNodeStore::new();
        store.set_scalar(path(), 1i64);

        let start = Instant::now();
        wait_for_value(
            &store,
            &path(),
            &NodeValue::Int(1),
            &PollSpec::attempts(Duration::from_secs(3600), 5),
        )
        .await
        .unwrap();

        // A single read; under the paused clock any sleep would advance
        // mocked time and fail the elapsed check.
        assert_eq!(store.reads_of(&path()), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bound_makes_exactly_n_attempts() {
        let store = MockNodeStore::new();
        store.set_scalar(path(), 0i64);

        let interval = Duration::from_millis(10);
        let start = Instant::now();
        let err = wait_for_value(
            &store,
            &path(),
            &NodeValue::Int(1),
            &PollSpec::attempts(interval, 4),
        )
        .await
        .unwrap_err();

        assert_eq!(store.reads_of(&path()), 4);
        // Three sleeps between four attempts, none after the last.
        assert_eq!(start.elapsed(), interval * 3);
        match err {
            ShfError::TimedOut {
                last_value,
                attempts,
                ..
            } => {
                assert_eq!(last_value, Some(NodeValue::Int(0)));
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_on_later_attempt_stops_early() {
        let store = MockNodeStore::new();
        store.script_scalar(path(), [0i64, 0, 1, 0]);

        wait_for_value(
            &store,
            &path(),
            &NodeValue::Int(1),
            &PollSpec::attempts(Duration::from_millis(10), 10),
        )
        .await
        .unwrap();

        assert_eq!(store.reads_of(&path()), 3);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = MockNodeStore::new();
        let err = wait_for_value(
            &store,
            &path(),
            &NodeValue::Int(1),
            &PollSpec::attempts(Duration::from_millis(10), 3),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ShfError::Store(_)));
    }

    #[test]
    fn test_equality_is_typed() {
        // Int(0) must not match Double(0.0); the comparison below drives the
        // same PartialEq the poller uses.
        assert_ne!(NodeValue::Int(0), NodeValue::Double(0.0));
    }
}
