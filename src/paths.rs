//! Path utilities for stackup infrastructure.
//!
//! Provides centralized path resolution for all stackup-related files:
//!
//! # Base Directories
//! - [`base_dir`] - `~/.stackup/` (base directory for all stackup data)
//! - [`data_dir`] - `~/.stackup/data/` (provisioned database data directories)
//!
//! # Run Artifacts
//! - [`logs_dir`] - `<project>/logs/` (per-run component logs)
//! - [`reset_logs_dir`] - recreate the log directory at the start of a run

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Get the stackup base directory.
///
/// Resolution order:
/// 1. `STACKUP_HOME` environment variable (if set)
/// 2. `~/.stackup/` (default)
///
/// CI/CD systems can override the location by setting `STACKUP_HOME`.
pub fn base_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("STACKUP_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".stackup"))
}

/// Get the database data directory: `~/.stackup/data/`
///
/// Each provisioned database instance gets a subdirectory named after its
/// logical database name.
pub fn data_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("data"))
}

/// Get the per-run log directory for a project root: `<root>/logs/`
pub fn logs_dir(project_root: &Path) -> PathBuf {
    project_root.join("logs")
}

/// Delete and recreate the log directory for a fresh run.
///
/// Every run starts from an empty log directory so readiness markers from a
/// previous run cannot satisfy this run's watchers.
pub fn reset_logs_dir(project_root: &Path) -> Result<PathBuf> {
    let dir = logs_dir(project_root);

    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete log directory: {}", dir.display()))?;
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_dir_structure() {
        // When STACKUP_HOME is not set, derived paths live under ~/.stackup/
        if std::env::var("STACKUP_HOME").is_err() {
            let base = base_dir().unwrap();
            assert!(base.ends_with(".stackup"));
            assert!(data_dir().unwrap().starts_with(&base));
        }
    }

    #[test]
    fn test_reset_logs_dir_clears_previous_run() {
        let root = TempDir::new().unwrap();
        let dir = reset_logs_dir(root.path()).unwrap();
        std::fs::write(dir.join("broker.out"), "Broker running on port 1883").unwrap();

        let dir = reset_logs_dir(root.path()).unwrap();
        assert!(dir.exists());
        assert!(!dir.join("broker.out").exists());
    }

    #[test]
    fn test_logs_dir_is_project_relative() {
        let dir = logs_dir(Path::new("/tmp/project"));
        assert_eq!(dir, PathBuf::from("/tmp/project/logs"));
    }
}
