//! Start/stop state machine for background services.
//!
//! A [`Lifecycle`] owns the status channel and the shutdown token a service
//! loop observes. The owning service calls [`Lifecycle::begin_start`] to
//! transition to Running and obtain a fresh token for the loop it spawns; the
//! loop must call [`Lifecycle::mark_stopped`] when it exits. Status is the
//! single coordination point between caller threads and the background loop.

use super::status::ServiceStatus;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle state for one background service.
pub struct Lifecycle {
    status_tx: watch::Sender<ServiceStatus>,
    /// Recreated on every start so a stopped token never leaks into a new run.
    shutdown: Mutex<CancellationToken>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (status_tx, _status_rx) = watch::channel(ServiceStatus::Stopped);
        Self {
            status_tx,
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> ServiceStatus {
        *self.status_tx.borrow()
    }

    /// Attempts the Stopped -> Running transition.
    ///
    /// Returns a fresh shutdown token for the loop about to be spawned, or
    /// `None` when the service is already active (start is then a no-op).
    pub fn begin_start(&self) -> Option<CancellationToken> {
        let mut shutdown = self.shutdown.lock().expect("lifecycle lock poisoned");
        if self.status().is_active() {
            debug!("Start ignored: service already active");
            return None;
        }

        let token = CancellationToken::new();
        *shutdown = token.clone();
        self.status_tx.send_replace(ServiceStatus::Running);
        Some(token)
    }

    /// Requests the Running -> Stopping transition and cancels the loop token.
    ///
    /// A stop while already Stopped is a no-op.
    pub fn request_stop(&self) {
        let shutdown = self.shutdown.lock().expect("lifecycle lock poisoned");
        if self.status() == ServiceStatus::Stopped {
            debug!("Stop ignored: service already stopped");
            return;
        }

        self.status_tx.send_if_modified(|status| {
            if *status == ServiceStatus::Running {
                *status = ServiceStatus::Stopping;
                true
            } else {
                false
            }
        });
        shutdown.cancel();
    }

    /// Marks the service Stopped. Called by the loop as it exits.
    pub fn mark_stopped(&self) {
        self.status_tx.send_replace(ServiceStatus::Stopped);
    }

    /// Waits until the status reaches Stopped.
    pub async fn wait_until_stopped(&self) {
        let mut rx = self.status_tx.subscribe();
        // wait_for checks the current value first, so a service that already
        // stopped returns immediately.
        let _ = rx.wait_for(|status| *status == ServiceStatus::Stopped).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("status", &self.status())
            .finish()
    }
}
