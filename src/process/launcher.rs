//! Component launching: environment merging, log sinks, structured spawn.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::process::{ComponentSpec, ProcessHandle};

/// Launch one component, redirecting its output into per-component log files.
///
/// `{name}.out` and `{name}.err` are created (truncated) inside `logs_dir`
/// before the process starts; a sink that cannot be created aborts the
/// launch before anything spawns, so there is never an orphaned process or
/// a component writing into the void. The spawned command inherits the base
/// environment with the spec's overlay applied on top, later keys winning.
///
/// The caller is responsible for registering the returned handle.
///
/// # Errors
///
/// Returns [`Error::Io`] if a sink cannot be created and [`Error::Launch`]
/// if the command cannot be started (missing binary, bad working directory).
/// On spawn failure both sinks are closed before the error propagates.
pub fn launch(spec: &ComponentSpec, logs_dir: &Path) -> Result<ProcessHandle> {
    let out_path = logs_dir.join(format!("{}.out", spec.name));
    let err_path = logs_dir.join(format!("{}.err", spec.name));

    let out_sink = File::create(&out_path)
        .map_err(|e| Error::io(format!("creating log sink {}", out_path.display()), e))?;
    let err_sink = File::create(&err_path)
        .map_err(|e| Error::io(format!("creating log sink {}", err_path.display()), e))?;

    // The child writes through duplicated descriptors; the handle keeps the
    // originals so the sinks stay under the registry's ownership.
    let out_child = out_sink
        .try_clone()
        .map_err(|e| Error::io(format!("duplicating sink for '{}'", spec.name), e))?;
    let err_child = err_sink
        .try_clone()
        .map_err(|e| Error::io(format!("duplicating sink for '{}'", spec.name), e))?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_child))
        .stderr(Stdio::from(err_child));
    for (key, value) in &spec.env_overlay {
        command.env(key, value);
    }

    match command.spawn() {
        Ok(child) => {
            tracing::info!(
                component = %spec.name,
                pid = child.id(),
                program = %spec.program,
                "component spawned"
            );
            Ok(ProcessHandle::new(spec.name.clone(), child, out_sink, err_sink))
        },
        Err(e) => {
            // Sinks close here on drop; no descriptor outlives a failed spawn.
            drop(out_sink);
            drop(err_sink);
            Err(Error::launch(&spec.name, e.to_string()))
        },
    }
}
