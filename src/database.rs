//! Database provisioning and teardown for the stack's services.
//!
//! Each service owns a database addressed by a connection URI in its
//! environment overlay. This module derives the port and logical database
//! name from that URI, forks one database daemon per service on demand, and
//! shuts the daemons down again through their own shutdown command (a
//! detached daemon is not a child of the orchestrator, so signals are the
//! wrong tool).

use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use url::Url;

use crate::config::{Manifest, ShutdownPolicy};
use crate::error::{Error, Result};
use crate::process::{EphemeralResource, Registry};
use crate::{config, paths};

/// Port and logical database name derived from a `scheme://host:port/name` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUri {
    pub port: u16,
    pub name: String,
}

impl FromStr for DatabaseUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::config(format!("invalid database URI '{s}': {e}")))?;

        let port = url
            .port()
            .ok_or_else(|| Error::config(format!("database URI '{s}' has no port")))?;

        let name = url.path().trim_start_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(Error::config(format!(
                "database URI '{s}' has no database name"
            )));
        }

        Ok(Self {
            port,
            name: name.to_string(),
        })
    }
}

/// Look up a service's connection URI in its environment overlay, falling
/// back to the orchestrator's own environment.
fn uri_for_service(
    service: &str,
    overlay: &[(String, String)],
    uri_key: &str,
) -> Result<DatabaseUri> {
    let value = overlay
        .iter()
        .rev()
        .find(|(key, _)| key == uri_key)
        .map(|(_, value)| value.clone())
        .or_else(|| std::env::var(uri_key).ok())
        .ok_or_else(|| {
            Error::config(format!("{uri_key} is not defined for service '{service}'"))
        })?;

    value.parse()
}

/// Provision one detached database daemon per active service.
///
/// Ports and database names come from each service's connection URI; data
/// directories live under the stackup data dir, named after the database.
/// Every successfully forked daemon is registered with the registry as an
/// owned [`EphemeralResource`] immediately, so a failure partway through
/// still leaves the earlier instances reachable for teardown.
///
/// URIs are parsed for every service before the first daemon forks, so a
/// malformed URI surfaces before any process is spawned.
///
/// # Errors
///
/// Returns [`Error::Config`] for a missing or malformed URI and
/// [`Error::Launch`] if the daemon binary cannot be started or reports a
/// startup failure.
pub fn provision_instances(
    manifest: &Manifest,
    project_root: &Path,
    test_mode: bool,
    registry: &Registry,
) -> Result<()> {
    let env_file = manifest.env_file_for(test_mode);
    let data_root = paths::data_dir().map_err(|e| Error::config(e.to_string()))?;
    std::fs::create_dir_all(&data_root)
        .map_err(|e| Error::io(format!("creating data dir {}", data_root.display()), e))?;

    // Resolve every URI up front: configuration errors must surface before
    // any daemon forks.
    let mut plans = Vec::new();
    for service in manifest.active_services() {
        if manifest.database.exclude.contains(service) {
            continue;
        }
        let dir = project_root.join(&manifest.services.root).join(service);
        let overlay = config::load_env_overlay(&dir.join(env_file))
            .map_err(|e| Error::config(e.to_string()))?;
        let uri = uri_for_service(service, &overlay, &manifest.database.uri_key)?;
        plans.push((service.clone(), uri));
    }

    for (service, uri) in plans {
        let data_dir = data_root.join(&uri.name);
        let log_path = data_root.join(format!("{}.log", uri.name));
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| Error::io(format!("creating data dir {}", data_dir.display()), e))?;

        tracing::info!(
            service = %service,
            database = %uri.name,
            port = uri.port,
            "starting database instance"
        );

        let output = Command::new(&manifest.database.program)
            .arg("--port")
            .arg(uri.port.to_string())
            .arg("--dbpath")
            .arg(&data_dir)
            .arg("--logpath")
            .arg(&log_path)
            .arg("--fork")
            .output()
            .map_err(|e| Error::launch(format!("database for {service}"), e.to_string()))?;

        if !output.status.success() {
            crate::ui::print_error_box_from_output(
                &format!("Failed to start database for {service}"),
                &output,
            );
            return Err(Error::launch(
                format!("database for {service}"),
                format!("{} exited with {}", manifest.database.program, output.status),
            ));
        }

        registry.register_ephemeral(EphemeralResource {
            name: uri.name.clone(),
            data_dir,
            port: uri.port,
            owned: true,
        });
    }

    Ok(())
}

/// Run each active service's database reset command (test mode).
///
/// # Errors
///
/// Returns [`Error::Launch`] if a reset command cannot run or exits
/// non-zero; the captured output is printed so the operator sees why.
pub fn reset_databases(manifest: &Manifest, project_root: &Path) -> Result<()> {
    let (program, args) = manifest
        .database
        .reset_command
        .split_first()
        .ok_or_else(|| Error::config("database.reset_command cannot be empty"))?;

    for service in manifest.active_services() {
        if manifest.database.exclude.contains(service) {
            continue;
        }
        let dir = project_root.join(&manifest.services.root).join(service);

        tracing::info!(service = %service, "clearing database");
        let output = Command::new(program)
            .args(args)
            .current_dir(&dir)
            .output()
            .map_err(|e| Error::launch(service.clone(), e.to_string()))?;

        if !output.status.success() {
            crate::ui::print_error_box_from_output(
                &format!("Failed to clear database for {service}"),
                &output,
            );
            return Err(Error::launch(
                service.clone(),
                format!("database reset exited with {}", output.status),
            ));
        }
    }

    Ok(())
}

/// Shut down provisioned database instances, best-effort.
///
/// Respects the manifest policy: under [`ShutdownPolicy::Keep`] nothing is
/// touched, and resources the run does not own are always skipped. Failures
/// are collected per instance rather than propagated, matching the
/// terminator's sweep contract.
pub fn shutdown_instances(
    instances: Vec<EphemeralResource>,
    program: &str,
    policy: ShutdownPolicy,
) -> Vec<(String, Result<()>)> {
    let mut outcomes = Vec::new();

    for instance in instances {
        if policy == ShutdownPolicy::Keep || !instance.owned {
            tracing::info!(database = %instance.name, "leaving database instance running");
            continue;
        }
        if !instance.data_dir.exists() {
            tracing::warn!(
                database = %instance.name,
                path = %instance.data_dir.display(),
                "data directory missing; skipping shutdown"
            );
            continue;
        }

        tracing::info!(database = %instance.name, port = instance.port, "shutting down database instance");
        let result = Command::new(program)
            .arg("--shutdown")
            .arg("--dbpath")
            .arg(&instance.data_dir)
            .output()
            .map_err(|e| Error::launch(instance.name.clone(), e.to_string()))
            .and_then(|output| {
                if output.status.success() {
                    Ok(())
                } else {
                    crate::ui::print_error_box_from_output(
                        &format!("Failed to shut down database {}", instance.name),
                        &output,
                    );
                    Err(Error::launch(
                        instance.name.clone(),
                        format!("shutdown exited with {}", output.status),
                    ))
                }
            });

        outcomes.push((instance.name, result));
    }

    outcomes
}
