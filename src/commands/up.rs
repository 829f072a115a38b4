//! The `up` flow: bring the stack up, hold or test, tear it down.
//!
//! This is the command layer gluing the external collaborators (manifest,
//! env overlays, log directory, database provisioning) to the process
//! lifecycle engine. Everything here runs before the first spawn or after
//! the last termination; the ordering and failure semantics live in
//! [`crate::orchestrator`].

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Manifest;
use crate::orchestrator::{Orchestrator, RunOutcome, TeardownConfig};
use crate::process::Registry;
use crate::{database, paths, ui};

/// Execute the orchestrator.
///
/// # Errors
///
/// Any configuration, launch, readiness, or test failure; the stack has
/// already been torn down by the time the error propagates.
pub fn execute(manifest_path: &Path, test_mode: bool, provision_databases: bool) -> Result<()> {
    let manifest = Manifest::load_from(manifest_path)?;
    let validation = manifest.validate()?;
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }

    let project_root = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    // Fresh log directory per run: stale markers must never satisfy a watcher.
    let logs_dir = paths::reset_logs_dir(&project_root)?;

    let registry = Registry::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            // Teardown happens on the main thread; the handler only raises
            // the flag so a second interrupt cannot abandon a sweep in
            // progress.
            if shutdown.swap(true, Ordering::SeqCst) {
                eprintln!("\nShutdown already in progress...");
            } else {
                eprintln!("\nInterrupted. Cleaning up processes...");
            }
        })
        .context("Failed to install interrupt handler")?;
    }

    if provision_databases
        && let Err(e) = database::provision_instances(&manifest, &project_root, test_mode, &registry)
    {
        // Instances forked before the failure are already registered;
        // shut them down before surfacing the error.
        database::shutdown_instances(
            registry.drain_ephemerals(),
            &manifest.database.program,
            manifest.database.shutdown,
        );
        return Err(e.into());
    }

    if test_mode {
        database::reset_databases(&manifest, &project_root).map_err(|e| {
            database::shutdown_instances(
                registry.drain_ephemerals(),
                &manifest.database.program,
                manifest.database.shutdown,
            );
            e
        })?;
    }

    let stages = manifest.stage_groups(&project_root, test_mode)?;
    let teardown = TeardownConfig {
        grace_period: Duration::from_secs(manifest.grace_period_secs),
        db_program: manifest.database.program.clone(),
        db_policy: manifest.database.shutdown,
    };

    let mut orchestrator = Orchestrator::new(registry, logs_dir.clone(), teardown, shutdown);
    match orchestrator.run(&stages, test_mode) {
        Ok(RunOutcome::TestsPassed) => {
            println!("\nAll tests passed.");
            Ok(())
        },
        Ok(RunOutcome::CleanShutdown | RunOutcome::Interrupted) => Ok(()),
        Err(e) => {
            if let Some(component) = e.component() {
                ui::print_failure_report(&logs_dir, component);
            }
            Err(e.into())
        },
    }
}
