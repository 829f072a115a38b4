//! Typed errors for the orchestration core.
//!
//! This module provides structured errors for the process lifecycle engine,
//! mirroring the failure taxonomy of the orchestrator: configuration problems
//! surface before anything spawns, launch and readiness failures trigger a
//! full teardown, and termination failures are collected rather than thrown.

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestration errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed required settings. Fatal, detected before spawn.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external command could not be started.
    #[error("failed to launch '{name}': {reason}")]
    Launch { name: String, reason: String },

    /// A component never emitted its readiness marker within its deadline.
    #[error("[{component}] did not emit readiness marker '{marker}' within {timeout_secs}s")]
    ReadinessTimeout {
        component: String,
        marker: String,
        timeout_secs: u64,
    },

    /// Best-effort teardown of one handle failed. Never fatal to the sweep.
    #[error("failed to terminate pid {pid}: {reason}")]
    Termination { pid: u32, reason: String },

    /// The gateway's test run exited non-zero.
    #[error("gateway tests failed with exit code {code}")]
    TestsFailed { code: i32 },

    /// The operator interrupted the run. Mapped to a clean shutdown.
    #[error("interrupted by operator")]
    Interrupted,

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a launch error.
    pub fn launch(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Launch {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a termination error.
    pub fn termination(pid: u32, reason: impl Into<String>) -> Self {
        Self::Termination {
            pid,
            reason: reason.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The component this error concerns, if any.
    ///
    /// Used by the command layer to decide whose log tail to print.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::Launch { name, .. } => Some(name),
            Self::ReadinessTimeout { component, .. } => Some(component),
            _ => None,
        }
    }
}
