//! Configuration types for the stackup orchestrator.
//!
//! This module provides configuration structs for loading and validating
//! the stack manifest from `stackup.toml`. It includes:
//!
//! - [`Manifest`] - Root manifest struct
//! - [`BrokerConfig`] / [`ServicesConfig`] / [`GatewayConfig`] - Stage definitions
//! - [`DatabaseConfig`] - Database provisioning and teardown policy
//!
//! It also owns the `.env`-style overlay loader: each component's working
//! directory may carry a key/value file that is merged over the base process
//! environment at launch time (later keys win).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::{ComponentSpec, StageGroup, StageKind};

/// Default readiness deadline per component.
const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

/// Default window between the graceful stop request and the hard kill.
const DEFAULT_GRACE_PERIOD_SECS: u64 = 3;

/// Result of manifest validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// stackup.toml manifest structure.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    /// Environment overlay file name, relative to each component's directory.
    #[serde(default = "default_env_file")]
    pub env_file: String,
    /// Overlay file name used in test mode instead of `env_file`.
    #[serde(default = "default_test_env_file")]
    pub test_env_file: String,
    /// Readiness deadline applied to every component, in seconds.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Grace period between TERM and KILL during teardown, in seconds.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Component names excluded from spawning this run.
    #[serde(default)]
    pub skip: Vec<String>,

    pub broker: BrokerConfig,
    pub services: ServicesConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// The message broker stage (first to start).
#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    /// Directory of the broker, relative to the manifest.
    pub path: PathBuf,
    #[serde(default = "default_dev_command")]
    pub command: Vec<String>,
    pub ready_marker: String,
}

/// The backend services stage (started together after the broker).
#[derive(Debug, Deserialize)]
pub struct ServicesConfig {
    /// Directory containing one subdirectory per service.
    pub root: PathBuf,
    /// Service names, in spawn order.
    pub names: Vec<String>,
    #[serde(default = "default_dev_command")]
    pub command: Vec<String>,
    /// Marker shared by every service.
    pub ready_marker: String,
}

/// The API gateway stage (last to start; test runner in test mode).
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub path: PathBuf,
    #[serde(default = "default_dev_command")]
    pub command: Vec<String>,
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
    pub ready_marker: String,
}

/// Whether provisioned database instances are shut down when the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Shut down every instance this run provisioned (default).
    #[default]
    Always,
    /// Leave instances running across orchestrator invocations.
    Keep,
}

/// Database provisioning settings.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Database daemon binary.
    #[serde(default = "default_db_program")]
    pub program: String,
    /// Environment key holding each service's connection URI.
    #[serde(default = "default_uri_key")]
    pub uri_key: String,
    /// Per-service command that drops the service's database (test mode).
    #[serde(default = "default_reset_command")]
    pub reset_command: Vec<String>,
    #[serde(default)]
    pub shutdown: ShutdownPolicy,
    /// Service names excluded from database provisioning and resets.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            program: default_db_program(),
            uri_key: default_uri_key(),
            reset_command: default_reset_command(),
            shutdown: ShutdownPolicy::default(),
            exclude: Vec::new(),
        }
    }
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_test_env_file() -> String {
    ".env.test".to_string()
}

fn default_ready_timeout() -> u64 {
    DEFAULT_READY_TIMEOUT_SECS
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_dev_command() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "dev".to_string()]
}

fn default_test_command() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "test".to_string()]
}

fn default_db_program() -> String {
    "mongod".to_string()
}

fn default_uri_key() -> String {
    "DATABASE_URI".to_string()
}

fn default_reset_command() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "dropdb".to_string()]
}

impl Manifest {
    /// Load the manifest from stackup.toml in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if stackup.toml cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from("stackup.toml")
    }

    /// Load the manifest from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        let manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        Ok(manifest)
    }

    /// Validate the manifest.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Empty service list or service names
    /// - Empty commands or readiness markers
    /// - Zero readiness timeout
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.services.names.is_empty() {
            errors.push("services.names cannot be empty".to_string());
        }
        for name in &self.services.names {
            if name.is_empty() {
                errors.push("service names cannot be empty".to_string());
            }
        }

        for (label, command) in [
            ("broker.command", &self.broker.command),
            ("services.command", &self.services.command),
            ("gateway.command", &self.gateway.command),
            ("gateway.test_command", &self.gateway.test_command),
        ] {
            if command.is_empty() {
                errors.push(format!("{label} cannot be empty"));
            }
        }

        for (label, marker) in [
            ("broker.ready_marker", &self.broker.ready_marker),
            ("services.ready_marker", &self.services.ready_marker),
            ("gateway.ready_marker", &self.gateway.ready_marker),
        ] {
            if marker.is_empty() {
                errors.push(format!("{label} cannot be empty"));
            }
        }

        if self.ready_timeout_secs == 0 {
            errors.push("ready_timeout_secs must be greater than zero".to_string());
        }

        for name in &self.skip {
            if !self.services.names.contains(name) {
                warnings.push(format!("skip entry '{name}' matches no known service"));
            }
        }
        for name in &self.database.exclude {
            if !self.services.names.contains(name) {
                warnings.push(format!(
                    "database.exclude entry '{name}' matches no known service"
                ));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Invalid manifest:\n  - {}", errors.join("\n  - "));
        }

        Ok(ValidationResult { warnings })
    }

    /// The overlay file name for the selected mode.
    #[must_use]
    pub fn env_file_for(&self, test_mode: bool) -> &str {
        if test_mode {
            &self.test_env_file
        } else {
            &self.env_file
        }
    }

    /// Service names that will actually be spawned this run.
    pub fn active_services(&self) -> impl Iterator<Item = &String> {
        self.services
            .names
            .iter()
            .filter(|name| !self.skip.contains(name))
    }

    /// Build the ordered stage groups for this run.
    ///
    /// Loads each component's environment overlay eagerly so that an
    /// unreadable overlay surfaces before anything spawns. The returned
    /// groups are strictly ordered: broker, then all services, then gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if an overlay file exists but cannot be read.
    pub fn stage_groups(&self, project_root: &Path, test_mode: bool) -> Result<Vec<StageGroup>> {
        let env_file = self.env_file_for(test_mode);

        let broker_dir = project_root.join(&self.broker.path);
        let (program, args) = split_command("broker.command", &self.broker.command)?;
        let broker = ComponentSpec {
            name: "broker".to_string(),
            program,
            args,
            working_dir: broker_dir.clone(),
            env_overlay: load_env_overlay(&broker_dir.join(env_file))?,
            ready_marker: self.broker.ready_marker.clone(),
            ready_timeout_secs: self.ready_timeout_secs,
        };

        let mut services = Vec::new();
        for name in self.active_services() {
            let dir = project_root.join(&self.services.root).join(name);
            let (program, args) = split_command("services.command", &self.services.command)?;
            services.push(ComponentSpec {
                name: name.clone(),
                program,
                args,
                working_dir: dir.clone(),
                env_overlay: load_env_overlay(&dir.join(env_file))?,
                ready_marker: self.services.ready_marker.clone(),
                ready_timeout_secs: self.ready_timeout_secs,
            });
        }

        let gateway_command = if test_mode {
            &self.gateway.test_command
        } else {
            &self.gateway.command
        };
        let gateway_dir = project_root.join(&self.gateway.path);
        let (program, args) = split_command("gateway command", gateway_command)?;
        let gateway = ComponentSpec {
            name: "gateway".to_string(),
            program,
            args,
            working_dir: gateway_dir.clone(),
            env_overlay: load_env_overlay(&gateway_dir.join(env_file))?,
            ready_marker: self.gateway.ready_marker.clone(),
            ready_timeout_secs: self.ready_timeout_secs,
        };

        Ok(vec![
            StageGroup {
                kind: StageKind::Broker,
                members: vec![broker],
            },
            StageGroup {
                kind: StageKind::Services,
                members: services,
            },
            StageGroup {
                kind: StageKind::Gateway,
                members: vec![gateway],
            },
        ])
    }
}

fn split_command(label: &str, command: &[String]) -> Result<(String, Vec<String>)> {
    let (program, args) = command
        .split_first()
        .with_context(|| format!("{label} cannot be empty"))?;
    Ok((program.clone(), args.to_vec()))
}

/// Load a `.env`-style overlay file into an ordered key/value list.
///
/// A missing file is not an error: components without an overlay run with
/// the base environment alone. Supported syntax is one `KEY=VALUE` per line,
/// `#` comments, blank lines, an optional `export ` prefix, and single or
/// double quotes around the value.
pub fn load_env_overlay(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no environment overlay file");
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read environment overlay: {}", path.display()))?;

    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            pairs.push((key.to_string(), value.to_string()));
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [broker]
        path = "broker"
        ready_marker = "Broker running on port"

        [services]
        root = "services"
        names = ["user_service", "chat_service"]
        ready_marker = "Subscribed to MQTT topics"

        [gateway]
        path = "api_gateway"
        ready_marker = "Gateway running on port"
    "#;

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest: Manifest = toml::from_str(MINIMAL).unwrap();
        assert_eq!(manifest.env_file, ".env");
        assert_eq!(manifest.test_env_file, ".env.test");
        assert_eq!(manifest.ready_timeout_secs, 30);
        assert_eq!(manifest.grace_period_secs, 3);
        assert_eq!(manifest.broker.command, vec!["npm", "run", "dev"]);
        assert_eq!(manifest.gateway.test_command, vec!["npm", "run", "test"]);
        assert_eq!(manifest.database.program, "mongod");
        assert_eq!(manifest.database.shutdown, ShutdownPolicy::Always);
        manifest.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_services() {
        let mut manifest: Manifest = toml::from_str(MINIMAL).unwrap();
        manifest.services.names.clear();
        let err = manifest.validate().unwrap_err().to_string();
        assert!(err.contains("services.names"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut manifest: Manifest = toml::from_str(MINIMAL).unwrap();
        manifest.ready_timeout_secs = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_unknown_skip() {
        let mut manifest: Manifest = toml::from_str(MINIMAL).unwrap();
        manifest.skip.push("no_such_service".to_string());
        let result = manifest.validate().unwrap();
        assert!(result.has_warnings());
        assert!(result.warnings[0].contains("no_such_service"));
    }

    #[test]
    fn test_stage_groups_order_and_test_command() {
        let root = TempDir::new().unwrap();
        let manifest: Manifest = toml::from_str(MINIMAL).unwrap();

        let stages = manifest.stage_groups(root.path(), true).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].kind, StageKind::Broker);
        assert_eq!(stages[1].kind, StageKind::Services);
        assert_eq!(stages[2].kind, StageKind::Gateway);
        assert_eq!(stages[1].members.len(), 2);
        assert_eq!(stages[1].members[0].name, "user_service");

        // Test mode swaps in the gateway's test command.
        assert_eq!(stages[2].members[0].args, vec!["run", "test"]);
    }

    #[test]
    fn test_stage_groups_respects_skip_list() {
        let root = TempDir::new().unwrap();
        let mut manifest: Manifest = toml::from_str(MINIMAL).unwrap();
        manifest.skip.push("chat_service".to_string());

        let stages = manifest.stage_groups(root.path(), false).unwrap();
        assert_eq!(stages[1].members.len(), 1);
        assert_eq!(stages[1].members[0].name, "user_service");
    }

    #[test]
    fn test_env_overlay_parsing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# comment\n\nPORT=3001\nexport NAME=\"chat service\"\nNAME='final'\nBROKEN_LINE\n",
        )
        .unwrap();

        let pairs = load_env_overlay(&path).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("PORT".to_string(), "3001".to_string()));
        assert_eq!(pairs[1], ("NAME".to_string(), "chat service".to_string()));
        // Later keys win when the overlay is applied in order.
        assert_eq!(pairs[2], ("NAME".to_string(), "final".to_string()));
    }

    #[test]
    fn test_env_overlay_missing_file_is_empty() {
        let pairs = load_env_overlay(Path::new("/nonexistent/.env")).unwrap();
        assert!(pairs.is_empty());
    }
}
