//! stackup: local orchestrator for a broker/services/gateway stack.
//!
//! Brings up a set of independently-deployable components in strict
//! dependency order, gates each stage on textual readiness markers in the
//! components' log output, and guarantees that every spawned process tree
//! (including detached database daemons) is torn down when the run ends,
//! whether it ends in success, failure, or Ctrl-C.
//!
//! ## Module overview
//!
//! - [`process`]: The lifecycle engine (registry, launcher, readiness
//!   watcher, process-tree terminator)
//! - [`orchestrator`]: The state machine sequencing stage groups
//! - [`config`]: `stackup.toml` manifest and `.env` overlay loading
//! - [`database`]: Connection-URI parsing and database daemon lifecycle
//! - [`commands`]: CLI entry points
//! - [`paths`]: Base-directory and per-run log-directory resolution
//! - [`ui`]: Terminal output helpers

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod orchestrator;
pub mod paths;
pub mod process;
pub mod ui;

pub use error::{Error, Result};
