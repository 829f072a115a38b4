//! End-to-end lifecycle scenarios against real OS processes.
//!
//! Components are stand-in shell scripts that emit their readiness markers
//! to stdout after a delay and record their spawn/ready instants in a shared
//! order file, so barrier ordering can be asserted after the fact.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use stackup::error::Error;
use stackup::orchestrator::{Orchestrator, RunOutcome, TeardownConfig};
use stackup::process::{ComponentSpec, Registry, StageGroup, StageKind, is_running};

const READY_TIMEOUT_SECS: u64 = 20;

struct Harness {
    _dir: TempDir,
    logs_dir: PathBuf,
    order_file: PathBuf,
    pid_dir: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let logs_dir = dir.path().join("logs");
        let pid_dir = dir.path().join("pids");
        std::fs::create_dir_all(&logs_dir).unwrap();
        std::fs::create_dir_all(&pid_dir).unwrap();
        let order_file = dir.path().join("order.log");
        Self {
            _dir: dir,
            logs_dir,
            order_file,
            pid_dir,
        }
    }

    /// A component that records itself, waits, emits its marker, then idles.
    fn component(&self, name: &str, delay_secs: u64, marker: &str, tail: &str) -> ComponentSpec {
        let script = format!(
            "echo $$ > \"$PID_DIR/{name}.pid\"; \
             echo \"start {name} $(date +%s)\" >> \"$ORDER_FILE\"; \
             sleep {delay_secs}; \
             echo \"{marker}\"; \
             echo \"ready {name} $(date +%s)\" >> \"$ORDER_FILE\"; \
             {tail}"
        );
        ComponentSpec {
            name: name.to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
            working_dir: PathBuf::from("."),
            env_overlay: vec![
                (
                    "ORDER_FILE".to_string(),
                    self.order_file.display().to_string(),
                ),
                ("PID_DIR".to_string(), self.pid_dir.display().to_string()),
            ],
            ready_marker: marker.to_string(),
            ready_timeout_secs: READY_TIMEOUT_SECS,
        }
    }

    fn orchestrator(&self) -> (Orchestrator, Registry) {
        let registry = Registry::new();
        let orchestrator = Orchestrator::new(
            registry.clone(),
            self.logs_dir.clone(),
            TeardownConfig {
                grace_period: Duration::from_secs(3),
                ..TeardownConfig::default()
            },
            Arc::new(AtomicBool::new(false)),
        );
        (orchestrator, registry)
    }

    fn pid_of(&self, name: &str) -> Option<u32> {
        std::fs::read_to_string(self.pid_dir.join(format!("{name}.pid")))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Parse the order file into `(event, name) -> unix seconds`.
    fn timeline(&self) -> HashMap<(String, String), u64> {
        let content = std::fs::read_to_string(&self.order_file).unwrap();
        let mut timeline = HashMap::new();
        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if let [event, name, stamp] = parts[..] {
                timeline.insert(
                    (event.to_string(), name.to_string()),
                    stamp.parse::<u64>().unwrap(),
                );
            }
        }
        timeline
    }
}

fn stage(kind: StageKind, members: Vec<ComponentSpec>) -> StageGroup {
    StageGroup { kind, members }
}

#[test]
#[serial]
fn full_lifecycle_respects_stage_barriers() {
    let harness = Harness::new();

    let stages = vec![
        stage(
            StageKind::Broker,
            vec![harness.component("broker", 1, "Broker running on port", "sleep 60 & wait")],
        ),
        stage(
            StageKind::Services,
            vec![
                harness.component("svcA", 2, "Subscribed to MQTT topics", "sleep 60"),
                harness.component("svcB", 3, "Subscribed to MQTT topics", "sleep 60"),
            ],
        ),
        stage(
            StageKind::Gateway,
            vec![harness.component("gateway", 1, "Gateway running on port", "exit 0")],
        ),
    ];

    let (mut orchestrator, registry) = harness.orchestrator();
    let outcome = orchestrator.run(&stages, true).unwrap();
    assert_eq!(outcome, RunOutcome::TestsPassed);
    assert!(registry.is_empty());

    // Barrier ordering: no member of a group starts before every member of
    // the previous group was observed ready.
    let timeline = harness.timeline();
    let at = |event: &str, name: &str| timeline[&(event.to_string(), name.to_string())];

    assert!(at("start", "svcA") >= at("ready", "broker"));
    assert!(at("start", "svcB") >= at("ready", "broker"));
    assert!(at("start", "gateway") >= at("ready", "svcA"));
    assert!(at("start", "gateway") >= at("ready", "svcB"));

    // Within a group, spawn order is insertion order.
    assert!(at("start", "svcA") <= at("start", "svcB"));

    // Nothing survives the run.
    for name in ["broker", "svcA", "svcB"] {
        let pid = harness.pid_of(name).unwrap();
        assert!(!is_running(pid), "{name} (pid {pid}) survived teardown");
    }
}

#[test]
#[serial]
fn readiness_timeout_tears_down_earlier_stages() {
    let harness = Harness::new();

    // svcB never emits the marker the watcher is waiting for.
    let mut silent = harness.component("svcB", 1, "svcB has no marker", "sleep 60");
    silent.ready_marker = "Subscribed to MQTT topics".to_string();
    silent.ready_timeout_secs = 3;

    let stages = vec![
        stage(
            StageKind::Broker,
            vec![harness.component("broker", 1, "Broker running on port", "sleep 60")],
        ),
        stage(
            StageKind::Services,
            vec![
                harness.component("svcA", 1, "Subscribed to MQTT topics", "sleep 60"),
                silent,
            ],
        ),
        stage(
            StageKind::Gateway,
            vec![harness.component("gateway", 1, "Gateway running on port", "sleep 60")],
        ),
    ];

    let (mut orchestrator, registry) = harness.orchestrator();
    let err = orchestrator.run(&stages, false).unwrap_err();

    match err {
        Error::ReadinessTimeout {
            component,
            timeout_secs,
            ..
        } => {
            assert_eq!(component, "svcB");
            assert_eq!(timeout_secs, 3);
        },
        other => panic!("expected readiness timeout, got: {other}"),
    }

    // The gateway stage was never reached.
    assert!(harness.pid_of("gateway").is_none());

    // Everything that did start was torn down.
    assert!(registry.is_empty());
    for name in ["broker", "svcA", "svcB"] {
        let pid = harness.pid_of(name).unwrap();
        assert!(!is_running(pid), "{name} (pid {pid}) survived teardown");
    }
}

#[test]
#[serial]
fn failing_test_run_is_reported_after_teardown() {
    let harness = Harness::new();

    let stages = vec![
        stage(
            StageKind::Broker,
            vec![harness.component("broker", 1, "Broker running on port", "sleep 60")],
        ),
        stage(
            StageKind::Services,
            vec![harness.component("svcA", 1, "Subscribed to MQTT topics", "sleep 60")],
        ),
        stage(
            StageKind::Gateway,
            vec![harness.component("gateway", 1, "Gateway running on port", "exit 7")],
        ),
    ];

    let (mut orchestrator, registry) = harness.orchestrator();
    let err = orchestrator.run(&stages, true).unwrap_err();
    assert!(matches!(err, Error::TestsFailed { code: 7 }));

    assert!(registry.is_empty());
    for name in ["broker", "svcA"] {
        let pid = harness.pid_of(name).unwrap();
        assert!(!is_running(pid), "{name} (pid {pid}) survived teardown");
    }
}

#[test]
#[serial]
fn launch_failure_in_second_stage_tears_down_first() {
    let harness = Harness::new();

    let broken = ComponentSpec {
        name: "svcA".to_string(),
        program: "definitely-not-a-binary-xyz".to_string(),
        args: Vec::new(),
        working_dir: PathBuf::from("."),
        env_overlay: Vec::new(),
        ready_marker: "never".to_string(),
        ready_timeout_secs: READY_TIMEOUT_SECS,
    };

    let stages = vec![
        stage(
            StageKind::Broker,
            vec![harness.component("broker", 1, "Broker running on port", "sleep 60")],
        ),
        stage(StageKind::Services, vec![broken]),
    ];

    let (mut orchestrator, registry) = harness.orchestrator();
    let err = orchestrator.run(&stages, false).unwrap_err();
    assert!(matches!(err, Error::Launch { .. }));
    assert_eq!(err.component(), Some("svcA"));

    assert!(registry.is_empty());
    let pid = harness.pid_of("broker").unwrap();
    assert!(!is_running(pid), "broker (pid {pid}) survived teardown");
}

/// Interrupt raised while awaiting readiness maps to a clean outcome after
/// the registry has been swept.
#[test]
#[serial]
fn interrupt_during_startup_still_tears_down() {
    let harness = Harness::new();

    let stages = vec![stage(
        StageKind::Broker,
        // Marker never appears; the interrupt cuts the wait short.
        vec![harness.component("broker", 60, "Broker running on port", "sleep 60")],
    )];

    let registry = Registry::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut orchestrator = Orchestrator::new(
        registry.clone(),
        harness.logs_dir.clone(),
        TeardownConfig {
            grace_period: Duration::from_secs(3),
            ..TeardownConfig::default()
        },
        shutdown.clone(),
    );

    let flag = shutdown.clone();
    let raiser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(2));
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    let outcome = orchestrator.run(&stages, false).unwrap();
    assert_eq!(outcome, RunOutcome::Interrupted);
    raiser.join().unwrap();

    assert!(registry.is_empty());
    // The broker had written its pid before the interrupt landed.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let pid = loop {
        if let Some(pid) = harness.pid_of("broker") {
            break pid;
        }
        assert!(std::time::Instant::now() < deadline, "broker never started");
        std::thread::sleep(Duration::from_millis(100));
    };
    assert!(!is_running(pid), "broker (pid {pid}) survived teardown");
}
