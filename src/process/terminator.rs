//! Process-tree termination with graceful-then-forceful escalation.
//!
//! Components like `npm run dev` fork freely (package manager, node, file
//! watchers), so killing the handle's pid alone would orphan the real
//! workers. Termination therefore resolves the full descendant set from the
//! system process table first, signals the whole tree politely, and only
//! escalates to a hard kill for survivors of the grace period.

use chrono::Utc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};

use crate::error::{Error, Result};
use crate::process::ProcessHandle;

/// How often the grace-period wait re-checks the process table.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Outcome of one handle's termination attempt within a sweep.
#[derive(Debug)]
pub struct TerminationOutcome {
    pub name: String,
    pub pid: u32,
    pub result: Result<()>,
}

/// Checks if a process with the given PID is currently running.
///
/// A zombie still occupies a process table slot until its parent reaps it;
/// for orchestration purposes it is already gone.
#[must_use]
pub fn is_running(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    alive(&system, Pid::from(pid as usize))
}

fn alive(system: &System, pid: Pid) -> bool {
    match system.process(pid) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

/// Resolve the transitive descendants of `root` at call time.
///
/// Best-effort snapshot: a process that forks after resolution is missed.
fn descendants(system: &System, root: Pid) -> Vec<Pid> {
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }

    found
}

/// Deliver a graceful stop signal, reporting failure without aborting.
fn send_term(system: &System, pid: Pid) -> bool {
    match system.process(pid) {
        Some(process) => match process.kill_with(Signal::Term) {
            Some(delivered) => delivered,
            // Platform without TERM; the KILL escalation below still applies.
            None => false,
        },
        // Already gone between resolution and delivery.
        None => true,
    }
}

/// Terminate `pid` and its full process tree.
///
/// 1. Liveness probe first: an already-exited pid is a no-op success, so
///    stale handles never produce false failures.
/// 2. Graceful stop (TERM) to every descendant, then to the root itself.
/// 3. Wait up to `grace_period` for the whole tree to leave the table.
/// 4. Hard kill (KILL) to any survivors.
///
/// Individual signal-delivery failures (process already gone, permission
/// denied) are logged and do not abort the sweep of the remaining tree
/// members.
///
/// # Errors
///
/// Returns [`Error::Termination`] only if the root process is still alive
/// after the KILL escalation. Callers tearing down multiple handles should
/// treat this as a per-handle outcome, not a reason to stop.
pub fn terminate_tree(pid: u32, grace_period: Duration) -> Result<()> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let root = Pid::from(pid as usize);
    if !alive(&system, root) {
        tracing::debug!(pid, "process already exited; nothing to terminate");
        return Ok(());
    }

    // Children receive the polite signal before the root, matching the
    // order a shutdown hook inside the root would expect.
    let mut targets = descendants(&system, root);
    targets.push(root);

    for target in &targets {
        if !send_term(&system, *target) {
            tracing::warn!(pid = target.as_u32(), "graceful stop signal not delivered");
        }
    }

    let deadline = Instant::now() + grace_period;
    loop {
        system.refresh_processes(ProcessesToUpdate::All, true);
        let survivors: Vec<Pid> = targets
            .iter()
            .copied()
            .filter(|p| alive(&system, *p))
            .collect();

        if survivors.is_empty() {
            return Ok(());
        }

        if Instant::now() >= deadline {
            for survivor in &survivors {
                if let Some(process) = system.process(*survivor)
                    && !process.kill()
                {
                    tracing::warn!(pid = survivor.as_u32(), "kill signal not delivered");
                }
            }
            break;
        }

        std::thread::sleep(WAIT_POLL);
    }

    // KILL is not synchronous; give the table a moment to settle.
    std::thread::sleep(Duration::from_millis(200));
    system.refresh_processes(ProcessesToUpdate::All, true);

    if alive(&system, root) {
        return Err(Error::termination(pid, "still alive after kill escalation"));
    }
    for target in &targets {
        if alive(&system, *target) {
            tracing::warn!(
                pid = target.as_u32(),
                root = pid,
                "descendant survived kill escalation"
            );
        }
    }

    Ok(())
}

/// Terminate every handle in the batch, collecting per-handle outcomes.
///
/// This is the single non-throwing teardown contract: one misbehaving
/// process cannot block cleanup of its siblings, and no error crosses this
/// boundary. Handles are consumed; their log sinks are closed here, exactly
/// once, whether or not termination succeeded.
pub fn sweep(handles: Vec<ProcessHandle>, grace_period: Duration) -> Vec<TerminationOutcome> {
    handles
        .into_iter()
        .map(|mut handle| {
            let pid = handle.pid();
            let name = handle.name().to_string();
            let uptime_secs = Utc::now()
                .signed_duration_since(handle.spawned_at())
                .num_seconds();
            tracing::info!(component = %name, pid, uptime_secs, "terminating component");

            let result = terminate_tree(pid, grace_period);
            handle.reap();
            handle.close_sinks();

            if let Err(e) = &result {
                tracing::warn!(component = %name, pid, error = %e, "termination failed");
            }

            TerminationOutcome { name, pid, result }
        })
        .collect()
}
