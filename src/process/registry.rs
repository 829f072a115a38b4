//! Active-set bookkeeping for spawned processes.
//!
//! Every handle the launcher produces must be registered here before the
//! orchestrator proceeds, so that the teardown sweep can always reach it.
//! A spawn that is never registered would leak an OS process and its open
//! log descriptors, which is the one invariant this crate exists to uphold.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::process::{EphemeralResource, ProcessHandle};

#[derive(Default)]
struct Inner {
    handles: Vec<ProcessHandle>,
    ephemerals: Vec<EphemeralResource>,
}

/// Tracks every spawned process plus any ephemeral resources.
///
/// Cloning is cheap and shares the underlying set. The orchestrator thread
/// is the only mutator; the mutex exists because the interrupt handler
/// thread installed by `ctrlc` may take read snapshots while the main
/// thread is mid-registration, and registration must be atomic with
/// respect to it.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the active set. Idempotent: registering a pid that
    /// is already present leaves the existing entry in place.
    pub fn register(&self, handle: ProcessHandle) {
        let mut inner = self.inner.lock();
        if inner.handles.iter().any(|h| h.pid() == handle.pid()) {
            tracing::debug!(pid = handle.pid(), "handle already registered");
            return;
        }
        inner.handles.push(handle);
    }

    /// Track an ephemeral resource for optional teardown.
    pub fn register_ephemeral(&self, resource: EphemeralResource) {
        self.inner.lock().ephemerals.push(resource);
    }

    /// Snapshot of `(pid, name)` for every active handle, in insertion order.
    #[must_use]
    pub fn pids(&self) -> Vec<(u32, String)> {
        self.inner
            .lock()
            .handles
            .iter()
            .map(|h| (h.pid(), h.name().to_string()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().handles.is_empty()
    }

    /// Non-blocking exit probe for the named handle.
    ///
    /// Returns `Ok(Some(code))` once the process has exited. The lock is
    /// held only for the probe itself, never across a wait.
    pub fn try_wait(&self, name: &str) -> Result<Option<i32>> {
        let mut inner = self.inner.lock();
        let handle = inner
            .handles
            .iter_mut()
            .find(|h| h.name() == name)
            .ok_or_else(|| Error::config(format!("no handle registered for '{name}'")))?;

        handle
            .try_wait()
            .map_err(|e| Error::io(format!("polling exit of '{name}'"), e))
    }

    /// Take ownership of every active handle, in insertion order, leaving
    /// the active set empty. Teardown consumes the result exactly once.
    #[must_use]
    pub fn drain(&self) -> Vec<ProcessHandle> {
        std::mem::take(&mut self.inner.lock().handles)
    }

    /// Take ownership of every tracked ephemeral resource.
    #[must_use]
    pub fn drain_ephemerals(&self) -> Vec<EphemeralResource> {
        std::mem::take(&mut self.inner.lock().ephemerals)
    }

    /// Empty the set after a successful teardown, closing any sinks that
    /// are somehow still open.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for handle in &mut inner.handles {
            handle.close_sinks();
        }
        inner.handles.clear();
        inner.ephemerals.clear();
    }
}
