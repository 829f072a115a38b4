//! Process lifecycle engine.
//!
//! This module owns every OS process the orchestrator spawns, from launch to
//! guaranteed teardown:
//!
//! - `handle`: Process handles, component specs, and stage groups
//! - `registry`: The active-set bookkeeping that makes teardown total
//! - `launcher`: Environment merging, log sinks, and structured spawning
//! - `readiness`: Log-marker polling that sequences startup
//! - `terminator`: Process-tree discovery and TERM/KILL escalation

mod handle;
mod launcher;
mod readiness;
mod registry;
mod terminator;

pub use handle::{ComponentSpec, EphemeralResource, ProcessHandle, StageGroup, StageKind};
pub use launcher::launch;
pub use readiness::await_ready;
pub use registry::Registry;
pub use terminator::{TerminationOutcome, is_running, sweep, terminate_tree};
