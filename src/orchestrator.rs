//! The lifecycle state machine driving the whole run.
//!
//! A single control thread walks the stage groups in their fixed order,
//! spawning each group's members and then blocking on their readiness
//! barrier before the next group may start. Any failure, anywhere, edges
//! straight into `ShuttingDown`, which sweeps the registry unconditionally
//! (partially-started stages included) and then handles ephemeral resources
//! per policy. Nothing the orchestrator spawned survives its exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::config::ShutdownPolicy;
use crate::error::{Error, Result};
use crate::process::{self, Registry, StageGroup, StageKind};
use crate::{database, ui};

/// How often the `Running` and test-mode waits re-check their conditions.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Lifecycle phases. `Terminated` is the single terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Spawning(StageKind),
    Awaiting(StageKind),
    Running,
    ShuttingDown,
    Terminated,
}

/// How a run ended, for exit-code mapping: all of these are exit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Interactive run shut down on operator request.
    CleanShutdown,
    /// Interrupt arrived before the stack was fully up.
    Interrupted,
    /// Test mode: the gateway's test run exited zero.
    TestsPassed,
}

/// Teardown settings carried from the manifest.
#[derive(Debug, Clone)]
pub struct TeardownConfig {
    pub grace_period: Duration,
    pub db_program: String,
    pub db_policy: ShutdownPolicy,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3),
            db_program: "mongod".to_string(),
            db_policy: ShutdownPolicy::Always,
        }
    }
}

pub struct Orchestrator {
    registry: Registry,
    logs_dir: PathBuf,
    teardown: TeardownConfig,
    /// Raised by the interrupt handler thread; only ever read here.
    shutdown: Arc<AtomicBool>,
    phase: Phase,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: Registry,
        logs_dir: PathBuf,
        teardown: TeardownConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            logs_dir,
            teardown,
            shutdown,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the full lifecycle: bring the stages up in order, hold in
    /// `Running` (interactive) or wait on the final stage's exit code
    /// (test mode), then tear everything down.
    ///
    /// Teardown runs on every path out of startup, including interrupts.
    /// An interrupt is mapped to a clean outcome after teardown completes;
    /// real failures propagate after teardown completes.
    ///
    /// # Errors
    ///
    /// Any launch failure, readiness timeout, or failing test run, after
    /// the unconditional teardown has finished.
    pub fn run(&mut self, stages: &[StageGroup], test_mode: bool) -> Result<RunOutcome> {
        let final_member = stages
            .last()
            .and_then(|group| group.members.last())
            .map(|spec| spec.name.clone());

        let outcome = match final_member {
            None => Err(Error::config("no stage groups to run")),
            Some(final_member) => match self.bring_up(stages) {
                Ok(()) => {
                    if test_mode {
                        self.await_final_exit(&final_member)
                    } else {
                        self.stay_running()
                    }
                },
                Err(e) => Err(e),
            },
        };

        self.shut_down();
        self.phase = Phase::Terminated;

        match outcome {
            Err(Error::Interrupted) => Ok(RunOutcome::Interrupted),
            other => other,
        }
    }

    /// Spawn and await each stage group in order.
    fn bring_up(&mut self, stages: &[StageGroup]) -> Result<()> {
        for group in stages {
            self.phase = Phase::Spawning(group.kind);
            tracing::info!(stage = %group.kind, members = group.members.len(), "spawning stage");

            for spec in &group.members {
                if self.shutdown.load(Ordering::SeqCst) {
                    return Err(Error::Interrupted);
                }
                let handle = process::launch(spec, &self.logs_dir)?;
                self.registry.register(handle);
            }

            self.phase = Phase::Awaiting(group.kind);
            for spec in &group.members {
                let pid = self
                    .registry
                    .pids()
                    .into_iter()
                    .find(|(_, name)| name == &spec.name)
                    .map(|(pid, _)| pid);

                process::await_ready(
                    &spec.name,
                    &self.logs_dir.join(format!("{}.out", spec.name)),
                    Duration::from_secs(spec.ready_timeout_secs),
                    &spec.ready_marker,
                    pid,
                    &self.shutdown,
                )?;
            }

            tracing::info!(stage = %group.kind, "stage ready");
        }

        Ok(())
    }

    /// Interactive mode: hold in `Running` until Enter or an interrupt.
    fn stay_running(&mut self) -> Result<RunOutcome> {
        self.phase = Phase::Running;
        println!("\nAll components are running. Press Enter (or Ctrl-C) to shut them down.");

        // The reader thread stays blocked on stdin if shutdown comes from an
        // interrupt instead; it dies with the process.
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            let _ = tx.send(());
        });

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(RunOutcome::CleanShutdown);
            }
            match rx.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                    return Ok(RunOutcome::CleanShutdown);
                },
                Err(mpsc::TryRecvError::Empty) => {},
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    /// Test mode: `Running` is skipped; the final stage's own exit code is
    /// the pass/fail signal.
    fn await_final_exit(&mut self, name: &str) -> Result<RunOutcome> {
        tracing::info!(component = name, "waiting for test run to finish");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }
            if let Some(code) = self.registry.try_wait(name)? {
                if code == 0 {
                    return Ok(RunOutcome::TestsPassed);
                }
                // A reported failure, not an internal error; teardown still
                // runs and the process exits 1.
                return Err(Error::TestsFailed { code });
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    /// Unconditional teardown: sweep every handle, then ephemeral resources.
    ///
    /// Per-handle failures are narrated and collected, never propagated; a
    /// second interrupt mid-teardown only re-raises a flag nobody reads
    /// here, so remaining handles are never abandoned.
    fn shut_down(&mut self) {
        self.phase = Phase::ShuttingDown;
        println!("\nCleaning up processes...");

        let handles = self.registry.drain();
        let outcomes = process::sweep(handles, self.teardown.grace_period);
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => println!("  terminated {} (pid {})", outcome.name, outcome.pid),
                Err(e) => ui::print_error_box(
                    &format!("Failed to terminate {} (pid {})", outcome.name, outcome.pid),
                    Some(&e.to_string()),
                    None,
                ),
            }
        }

        let ephemerals = self.registry.drain_ephemerals();
        for (name, result) in database::shutdown_instances(
            ephemerals,
            &self.teardown.db_program,
            self.teardown.db_policy,
        ) {
            match result {
                Ok(()) => println!("  shut down database {name}"),
                Err(e) => tracing::warn!(database = %name, error = %e, "database shutdown failed"),
            }
        }

        self.registry.clear();
        if failed == 0 {
            println!("Cleanup complete.");
        } else {
            println!("Cleanup finished with {failed} termination failure(s); see above.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_no_stages_is_config_error() {
        let mut orchestrator = Orchestrator::new(
            Registry::new(),
            PathBuf::from("/tmp"),
            TeardownConfig::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let err = orchestrator.run(&[], false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        // Even the degenerate run ends in the terminal phase.
        assert_eq!(orchestrator.phase(), Phase::Terminated);
    }
}
