//! Process-wide shutdown signal.
//!
//! Every connection's token is a child of the coordinator's token, so one
//! [`ShutdownCoordinator::shutdown`] closes the listener, the reaper and
//! all open sockets.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root cancellation token.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token cancelled with the root but closable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Fire the signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal and wait up to `timeout` for `handles` to finish.
    ///
    /// Tasks still running after the deadline are left to the runtime.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for server tasks"
        );

        let drain = futures::future::join_all(handles);
        match tokio::time::timeout(timeout, drain).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    warn!(panicked, "server tasks ended abnormally");
                }
                info!("shutdown complete");
            }
            Err(_) => warn!(?timeout, "shutdown timed out, abandoning remaining tasks"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
