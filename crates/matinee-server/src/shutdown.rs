//! Graceful shutdown coordination via `CancellationToken`.
//!
//! The coordinator owns the long-lived server tasks (acceptor, event
//! bridge, reaper). Tasks take a child-able token at spawn time and are
//! registered here; `drain` cancels the token and waits for every
//! registered task to finish, abandoning stragglers after a timeout.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `ServerHandle::shutdown` waits before abandoning tasks.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across all server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with no registered tasks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get a clone of the cancellation token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track a task so `drain` waits for it.
    pub fn register(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    /// Initiate shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token and wait up to `timeout` for every registered
    /// task to finish. Tasks still running after the timeout are left
    /// to die with the process.
    pub async fn drain(&self, timeout: Duration) {
        self.shutdown();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        info!(
            task_count = tasks.len(),
            timeout_secs = timeout.as_secs(),
            "draining server tasks"
        );

        let joined = futures::future::join_all(tasks);
        if tokio::time::timeout(timeout, joined).await.is_err() {
            warn!("drain timed out after {timeout:?}, some tasks may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
