//! Deferred deletion of finished workspaces.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::Workspace;

/// Process-wide registry of workspaces waiting for deletion.
///
/// `register` and the drain in `run_pending` take the same lock; deletion
/// itself happens after the lock is released.
#[derive(Debug, Default)]
pub struct CleanupScheduler {
    pending: Mutex<Vec<Workspace>>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Workspace>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, workspace: Workspace) {
        debug!(
            request_id = %workspace.request_id(),
            workspace = %workspace.path().display(),
            "workspace registered for cleanup"
        );
        self.lock().push(workspace);
    }

    /// Destroys every registered workspace and clears the registry.
    /// Returns how many were swept.
    pub fn run_pending(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for workspace in drained {
            workspace.destroy();
        }
        if count > 0 {
            info!(count, "cleaned up workspaces");
        }
        count
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    /// Runs a sweep on the blocking pool when inside a tokio runtime,
    /// inline otherwise.
    pub fn sweep_in_background(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                drop(handle.spawn_blocking(move || scheduler.run_pending()));
            }
            Err(_) => {
                scheduler.run_pending();
            }
        }
    }
}

/// Exclusive ownership of a live workspace on behalf of one request.
///
/// Dropping the ticket (or calling [`CleanupTicket::release`]) hands the
/// workspace to the scheduler, so every exit path of a request ends with its
/// workspace registered for deletion.
#[derive(Debug)]
pub struct CleanupTicket {
    workspace: Option<Workspace>,
    scheduler: Arc<CleanupScheduler>,
}

impl CleanupTicket {
    pub fn new(workspace: Workspace, scheduler: Arc<CleanupScheduler>) -> Self {
        Self {
            workspace: Some(workspace),
            scheduler,
        }
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn scheduler(&self) -> &Arc<CleanupScheduler> {
        &self.scheduler
    }

    /// Registers the workspace now.
    pub fn release(mut self) {
        self.register();
    }

    /// Registers the workspace and immediately starts a sweep. Used once the
    /// response body has been fully handed to the transport or abandoned.
    pub fn release_and_sweep(mut self) {
        self.register();
        self.scheduler.sweep_in_background();
    }

    fn register(&mut self) {
        if let Some(ws) = self.workspace.take() {
            self.scheduler.register(ws);
        }
    }
}

impl Drop for CleanupTicket {
    fn drop(&mut self) {
        self.register();
    }
}
