//! Readiness watching: poll a component's log for its marker string.
//!
//! The marker protocol decouples the orchestrator from each component's
//! internal startup duration without requiring a structured health-check
//! endpoint. The poll is deliberately coarse (1 second): stack startup is
//! measured in seconds, and this is the only suspension point in the
//! orchestrator's control thread besides the final test-mode wait.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::process::is_running;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Block until `marker` appears in the log file at `log_path`.
///
/// A log file that does not exist yet means the component simply has not
/// created it; the watcher keeps waiting rather than failing. Once present,
/// the file's full contents are re-read on every poll and checked for
/// substring containment.
///
/// If `pid` is given and the process disappears mid-wait, a warning is
/// logged once but the wait still runs to its deadline: an exited component
/// will never produce the marker, and the timeout is the single failure
/// signal for both cases.
///
/// # Errors
///
/// Returns [`Error::ReadinessTimeout`] once `timeout` elapses with no match,
/// and [`Error::Interrupted`] if the shared shutdown flag is raised mid-wait.
pub fn await_ready(
    name: &str,
    log_path: &Path,
    timeout: Duration,
    marker: &str,
    pid: Option<u32>,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let start = Instant::now();
    let mut warned_exit = false;

    tracing::info!(component = name, marker, "waiting for readiness marker");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }

        if log_path.exists() {
            // Component output is not guaranteed to be valid UTF-8.
            let contents = std::fs::read(log_path)
                .map_err(|e| Error::io(format!("reading log {}", log_path.display()), e))?;
            if String::from_utf8_lossy(&contents).contains(marker) {
                tracing::info!(
                    component = name,
                    elapsed_secs = start.elapsed().as_secs(),
                    "component ready"
                );
                return Ok(());
            }
        }

        if !warned_exit
            && let Some(pid) = pid
            && !is_running(pid)
        {
            tracing::warn!(
                component = name,
                pid,
                "process exited before emitting its readiness marker"
            );
            warned_exit = true;
        }

        if start.elapsed() >= timeout {
            return Err(Error::ReadinessTimeout {
                component: name.to_string(),
                marker: marker.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
