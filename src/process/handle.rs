//! Handle and spec types for spawned components.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::Child;

/// One stage of the stack to bring up. Immutable once built by the manifest.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    /// Logical name, used for log file naming and diagnostics.
    pub name: String,
    /// Program to execute. Always a structured command, never a shell string.
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Key/value pairs merged over the base environment, in order (later wins).
    pub env_overlay: Vec<(String, String)>,
    /// Substring the component writes to stdout once it can serve its role.
    pub ready_marker: String,
    pub ready_timeout_secs: u64,
}

/// The fixed startup order of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Broker,
    Services,
    Gateway,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => write!(f, "broker"),
            Self::Services => write!(f, "services"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

/// An ordered set of components that may start concurrently but must all
/// become ready before the next group starts.
#[derive(Debug, Clone)]
pub struct StageGroup {
    pub kind: StageKind,
    /// Spawn order is insertion order; readiness order within the group
    /// does not matter.
    pub members: Vec<ComponentSpec>,
}

/// A spawned external program together with its captured output sinks.
///
/// The handle owns its two log sinks and closes them exactly once, on every
/// exit path: either explicitly in [`ProcessHandle::close_sinks`] during the
/// teardown sweep, or implicitly on drop. The child process itself is *not*
/// killed on drop; killing is the terminator's job so that teardown failures
/// can be reported instead of silently swallowed.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Child,
    spawned_at: DateTime<Utc>,
    // The child writes through duplicated descriptors; these keep the files
    // addressable until the sweep releases them.
    out_sink: Option<File>,
    err_sink: Option<File>,
}

impl ProcessHandle {
    pub(crate) fn new(name: String, child: Child, out_sink: File, err_sink: File) -> Self {
        Self {
            name,
            child,
            spawned_at: Utc::now(),
            out_sink: Some(out_sink),
            err_sink: Some(err_sink),
        }
    }

    /// OS process id. Unique while the process is alive.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    /// Non-blocking exit probe. `Ok(Some(code))` once the process has exited.
    ///
    /// A process killed by a signal carries no exit code; it is reported as
    /// -1 so test mode still maps it to a failure.
    pub fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| status.code().unwrap_or(-1)))
    }

    /// Reap the child if it has already exited, clearing the zombie entry
    /// from the process table. Never blocks on a live process.
    pub(crate) fn reap(&mut self) {
        let _ = self.child.try_wait();
    }

    /// Close both log sinks. Idempotent.
    pub(crate) fn close_sinks(&mut self) {
        self.out_sink.take();
        self.err_sink.take();
    }
}

/// An externally-managed long-running process, e.g. a database daemon,
/// whose lifetime may intentionally outlive a single orchestrator run.
///
/// Unlike a [`ProcessHandle`] there is no child to wait on: the daemon
/// detaches at startup and is addressed through its data directory.
#[derive(Debug, Clone)]
pub struct EphemeralResource {
    /// Logical database name.
    pub name: String,
    /// Data directory the daemon was started against.
    pub data_dir: PathBuf,
    pub port: u16,
    /// Whether this run started the daemon. Resources that are known but
    /// not owned this run are never torn down.
    pub owned: bool,
}
