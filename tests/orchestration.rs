//! End-to-end protocol tests against the scripted mock store.
//!
//! These drive the orchestrators through the public API only, asserting the
//! externally observable protocol: which nodes get written, in which order,
//! and how many polls each phase issues.

use num_complex::Complex64;
use shf_daq::device::DeviceProfile;
use shf_daq::results::{AveragingMode, ResultLogger, ResultLoggerConfig, ResultMode};
use shf_daq::scope::{Scope, ScopeConfig, SwTriggerConfig};
use shf_daq::sequencer::{CompileOutcome, Sequencer, SequencerTarget};
use shf_daq::store::mock::StoreOp;
use shf_daq::store::MockNodeStore;
use shf_daq::{NodePath, NodeValue, ShfError, VectorRead};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const GEN: &str = "/dev1/qachannels/0/generator";
const SCOPE: &str = "/dev1/scopes/0";
const RESULT: &str = "/dev1/qachannels/0/readout/result";

fn profile() -> DeviceProfile {
    let _ = env_logger::builder().is_test(true).try_init();
    DeviceProfile::shfqa("dev1")
}

fn sequencer(store: &MockNodeStore) -> Sequencer<'_> {
    Sequencer::new(store, SequencerTarget::qa(&profile(), 0))
}

#[tokio::test(start_paused = true)]
async fn compile_and_load_success_polls_status_and_ready() {
    let store = MockNodeStore::new();
    // ready: 0 for the post-reset wait, then [0, 0, 1] for the loaded wait
    store.script_scalar(format!("{GEN}/ready"), [0i64, 0, 0, 1]);
    store.script_scalar(format!("{GEN}/compiler/status"), [-1i64, -1, 0]);
    store.set_scalar(format!("{GEN}/compiler/statusstring"), "");

    let report = sequencer(&store)
        .load_program("setTrigger(1);", Duration::from_secs(10), None)
        .await
        .unwrap();

    assert_eq!(report.outcome, CompileOutcome::Success);
    assert_eq!(report.channel, 0);
    // initial status read plus exactly 2 extra polls
    assert_eq!(
        store.reads_of(&NodePath::new(format!("{GEN}/compiler/status"))),
        3
    );
    // one read for the reset-low wait, then 1 + 2 extra for the ready wait
    assert_eq!(store.reads_of(&NodePath::new(format!("{GEN}/ready"))), 4);
}

#[tokio::test(start_paused = true)]
async fn compile_never_terminal_times_out() {
    let store = MockNodeStore::new();
    store.script_scalar(format!("{GEN}/ready"), [0i64]);
    store.set_scalar(format!("{GEN}/compiler/status"), -1i64);
    store.set_scalar(format!("{GEN}/compiler/statusstring"), "still compiling");

    let err = sequencer(&store)
        .load_program("setTrigger(1);", Duration::from_secs(1), None)
        .await
        .unwrap_err();

    match err {
        ShfError::CompileTimeout { channel, message } => {
            assert_eq!(channel, 0);
            assert_eq!(message, "still compiling");
        }
        other => panic!("expected CompileTimeout, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn compile_warning_surfaces_message_but_succeeds() {
    let store = MockNodeStore::new();
    store.script_scalar(format!("{GEN}/ready"), [0i64, 1]);
    store.script_scalar(format!("{GEN}/compiler/status"), [-1i64, 2]);
    store.set_scalar(
        format!("{GEN}/compiler/statusstring"),
        "unused variable 'w1'",
    );

    let report = sequencer(&store)
        .load_program("wave w1 = ones(32);", Duration::from_secs(10), None)
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        CompileOutcome::Warning("unused variable 'w1'".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn compile_failure_reports_status_and_message() {
    let store = MockNodeStore::new();
    store.script_scalar(format!("{GEN}/ready"), [0i64]);
    store.script_scalar(format!("{GEN}/compiler/status"), [-1i64, 1]);
    store.set_scalar(format!("{GEN}/compiler/statusstring"), "syntax error");

    let err = sequencer(&store)
        .load_program("playWave(;", Duration::from_secs(10), None)
        .await
        .unwrap_err();

    match err {
        ShfError::Compile {
            status, message, ..
        } => {
            assert_eq!(status, 1);
            assert_eq!(message, "syntax error");
        }
        other => panic!("expected Compile, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn ready_never_rising_is_distinct_from_compile_failure() {
    let store = MockNodeStore::new();
    // ready drops for the reset wait and then never rises again
    store.set_scalar(format!("{GEN}/ready"), 0i64);
    store.set_scalar(format!("{GEN}/compiler/status"), 0i64);
    store.set_scalar(format!("{GEN}/compiler/statusstring"), "");

    let err = sequencer(&store)
        .load_program("setTrigger(1);", Duration::from_millis(200), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ShfError::ReadyTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn scope_acquire_runs_full_protocol() {
    let store = MockNodeStore::new();
    // idle at arm time, armed after the enable, then three polls mid-capture
    store.script_scalar(format!("{SCOPE}/enable"), [0i64, 1, 1, 1, 1, 0]);
    store.set_scalar(format!("{SCOPE}/time"), 1i64);
    store.set_scalar(format!("{SCOPE}/channels/0/enable"), 1i64);
    store.set_scalar(format!("{SCOPE}/channels/1/enable"), 0i64);
    store.set_scalar(format!("{SCOPE}/channels/2/enable"), 0i64);
    store.set_scalar(format!("{SCOPE}/channels/3/enable"), 0i64);
    store.set_vector(
        format!("{SCOPE}/channels/0/wave"),
        VectorRead {
            samples: vec![Complex64::new(0.5, 0.0); 16],
            properties: HashMap::from([
                ("scaling".to_string(), 1e-7),
                ("averagecount".to_string(), 4.0),
            ]),
        },
    );

    let scope = Scope::new(&store, &profile(), 0);
    let config = ScopeConfig {
        input_select: BTreeMap::from([(0, "channel0_signal_input".to_string())]),
        num_samples: 16,
        trigger_input: None,
        ..ScopeConfig::default()
    };
    let trigger = SwTriggerConfig {
        num_triggers: 2,
        interval: Duration::from_millis(20),
    };

    let result = scope
        .acquire(&config, Some(&trigger), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(result.channels.len(), 1);
    let capture = &result.channels[0];
    assert_eq!(capture.samples.len(), 16);
    assert_eq!(capture.full_scale_range, 1e-7 * 4.0 * 8192.0);
    // decimation 2^1 halves the 2 GHz sampling rate
    assert_eq!(capture.time_axis[1], 1.0 / 1e9);

    // both software triggers were issued as blocking writes
    let trigger_node = NodePath::new("/dev1/system/swtriggers/0/single");
    let trigger_writes = store
        .writes()
        .into_iter()
        .filter(|op| {
            matches!(op, StoreOp::Write { path, sync: true, .. } if *path == trigger_node)
        })
        .count();
    assert_eq!(trigger_writes, 2);
}

#[tokio::test(start_paused = true)]
async fn scope_read_reflects_post_completion_vector() {
    let store = MockNodeStore::new();
    store.script_scalar(format!("{SCOPE}/enable"), [1i64, 1, 1, 0]);
    store.set_scalar(format!("{SCOPE}/time"), 0i64);
    store.set_scalar(format!("{SCOPE}/channels/0/enable"), 1i64);
    store.set_scalar(format!("{SCOPE}/channels/1/enable"), 0i64);
    store.set_scalar(format!("{SCOPE}/channels/2/enable"), 0i64);
    store.set_scalar(format!("{SCOPE}/channels/3/enable"), 0i64);
    store.set_vector(
        format!("{SCOPE}/channels/0/wave"),
        VectorRead {
            samples: vec![Complex64::new(1.0, -1.0); 8],
            properties: HashMap::from([
                ("scaling".to_string(), 1e-6),
                ("averagecount".to_string(), 1.0),
            ]),
        },
    );

    let result = Scope::new(&store, &profile(), 0)
        .read(Duration::from_secs(1))
        .await
        .unwrap();

    // exactly 3 extra polls beyond the initial read before the transition
    assert_eq!(store.reads_of(&NodePath::new(format!("{SCOPE}/enable"))), 4);

    // the vector read happens only after the completion flag cleared
    let log = store.log();
    let enable = NodePath::new(format!("{SCOPE}/enable"));
    let completion_pos = log
        .iter()
        .rposition(|op| matches!(op, StoreOp::Read(p) if *p == enable))
        .unwrap();
    let vector_pos = log
        .iter()
        .position(|op| matches!(op, StoreOp::ReadVector(_)))
        .unwrap();
    assert!(completion_pos < vector_pos);
    assert_eq!(result.channels[0].samples[0], Complex64::new(1.0, -1.0));
}

#[tokio::test(start_paused = true)]
async fn rearm_issues_disable_then_enable_never_enable_directly() {
    let store = MockNodeStore::new();
    store.script_scalar(format!("{RESULT}/enable"), [1i64, 0, 1]);

    let logger = ResultLogger::new(
        &store,
        &profile(),
        0,
        ResultMode::Readout {
            source: "result_of_integration".to_string(),
        },
    );
    logger.arm(Duration::from_secs(1)).await.unwrap();

    let enable = NodePath::new(format!("{RESULT}/enable"));
    let enable_writes: Vec<NodeValue> = store
        .writes()
        .into_iter()
        .filter_map(|op| match op {
            StoreOp::Write { path, value, .. } if path == enable => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(enable_writes, vec![NodeValue::Int(0), NodeValue::Int(1)]);
}

#[tokio::test(start_paused = true)]
async fn result_logger_full_run() {
    let store = MockNodeStore::new();
    // idle at arm, armed, then still accumulating for two polls
    store.script_scalar(format!("{RESULT}/enable"), [0i64, 1, 1, 1, 0]);
    for unit in 0..2 {
        store.set_vector(
            format!("{RESULT}/data/{unit}/wave"),
            VectorRead {
                samples: vec![Complex64::new(0.1 * (unit as f64 + 1.0), 0.0); 4],
                properties: HashMap::new(),
            },
        );
    }

    let logger = ResultLogger::new(
        &store,
        &profile(),
        0,
        ResultMode::Readout {
            source: "result_of_discrimination".to_string(),
        },
    );
    logger
        .configure(&ResultLoggerConfig {
            result_length: 4,
            num_averages: 1,
            averaging_mode: AveragingMode::Cyclic,
        })
        .await
        .unwrap();
    logger.arm(Duration::from_secs(1)).await.unwrap();
    let results = logger.read(2, Duration::from_secs(1)).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].len(), 4);
    assert_eq!(results[1][0], Complex64::new(0.2, 0.0));
}

#[tokio::test(start_paused = true)]
async fn independent_channels_orchestrate_concurrently() {
    let store = MockNodeStore::new();
    for channel in 0..2 {
        let gen = format!("/dev1/qachannels/{channel}/generator");
        store.script_scalar(format!("{gen}/ready"), [0i64, 1]);
        store.script_scalar(format!("{gen}/compiler/status"), [-1i64, 0]);
        store.set_scalar(format!("{gen}/compiler/statusstring"), "");
    }

    let seq0 = Sequencer::new(&store, SequencerTarget::qa(&profile(), 0));
    let seq1 = Sequencer::new(&store, SequencerTarget::qa(&profile(), 1));

    let (r0, r1) = tokio::join!(
        seq0.load_program("setTrigger(1);", Duration::from_secs(10), None),
        seq1.load_program("setTrigger(1);", Duration::from_secs(10), None),
    );
    assert_eq!(r0.unwrap().channel, 0);
    assert_eq!(r1.unwrap().channel, 1);
}
