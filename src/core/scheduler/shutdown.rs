//! Graceful two-phase shutdown.
//!
//! First termination signal: stop scheduling, let running tasks finish up to
//! the drain timeout, discard what is still queued, then close every session
//! and interactive window. A second signal while that is in progress exits
//! the process immediately with status 130.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::admission::AdmissionQueue;
use crate::core::executor::{Spawn, TaskExecutor};
use crate::core::session_pool::SessionPool;
use crate::runtime::signals::TerminationSignal;

/// Exit status used when a second signal forces termination.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    /// Normal operation.
    Running,
    /// Shutdown sequence in progress.
    Draining,
    /// Shutdown complete.
    Stopped,
}

/// What a completed shutdown did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Whether in-flight work finished within the drain timeout.
    pub drained: bool,
    /// Queued tasks discarded after the timeout.
    pub discarded: usize,
    /// Automated sessions closed.
    pub sessions_closed: usize,
    /// Interactive windows closed.
    pub windows_closed: usize,
    /// Admission entries dropped.
    pub entries_dropped: usize,
}

type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Runs the shutdown sequence exactly once.
pub struct ShutdownCoordinator<S: Spawn> {
    executor: TaskExecutor<S>,
    sessions: Arc<SessionPool>,
    admission: AdmissionQueue,
    cancel: CancellationToken,
    drain_timeout: Duration,
    phase: Mutex<ShutdownPhase>,
    exit_hook: ExitHook,
}

impl<S: Spawn> fmt::Debug for ShutdownCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("drain_timeout", &self.drain_timeout)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl<S: Spawn> ShutdownCoordinator<S> {
    /// Create a coordinator. The default exit hook calls [`std::process::exit`].
    pub fn new(
        executor: TaskExecutor<S>,
        sessions: Arc<SessionPool>,
        admission: AdmissionQueue,
        cancel: CancellationToken,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            sessions,
            admission,
            cancel,
            drain_timeout,
            phase: Mutex::new(ShutdownPhase::Running),
            exit_hook: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Replace the forced-exit action.
    #[must_use]
    pub fn with_exit_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit_hook = Arc::new(hook);
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.lock()
    }

    /// Run the shutdown sequence.
    ///
    /// Returns `None` if shutdown already started elsewhere.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        {
            let mut phase = self.phase.lock();
            if *phase != ShutdownPhase::Running {
                return None;
            }
            *phase = ShutdownPhase::Draining;
        }

        info!(timeout_secs = self.drain_timeout.as_secs(), "shutdown started, draining executor");
        self.cancel.cancel();

        let drained = self.executor.wait_for_completion(self.drain_timeout).await;
        let discarded = if drained {
            0
        } else {
            let stats = self.executor.stats();
            warn!(running = stats.running, queued = stats.queued, "drain timed out, discarding queued tasks");
            self.executor.clear_queue()
        };

        let sessions_closed = self.sessions.close_all().await;
        let (windows_closed, entries_dropped) = self.admission.close_all().await;

        *self.phase.lock() = ShutdownPhase::Stopped;
        let report = ShutdownReport {
            drained,
            discarded,
            sessions_closed,
            windows_closed,
            entries_dropped,
        };
        info!(?report, "shutdown complete");
        Some(report)
    }

    /// Drive shutdown from a signal stream.
    ///
    /// Waits for the first signal, then shuts down. A second signal before the
    /// sequence finishes invokes the exit hook with [`FORCED_EXIT_CODE`] and
    /// returns `None`. Also returns `None` if the stream ends before any signal.
    pub async fn listen(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<TerminationSignal>,
    ) -> Option<ShutdownReport> {
        let first = signals.recv().await?;
        info!(signal = %first, "termination signal received");

        let shutdown = self.shutdown();
        tokio::pin!(shutdown);
        let mut signals_open = true;
        loop {
            tokio::select! {
                biased;
                report = &mut shutdown => return report,
                next = signals.recv(), if signals_open => match next {
                    Some(signal) => {
                        error!(%signal, "second termination signal, forcing exit");
                        (self.exit_hook)(FORCED_EXIT_CODE);
                        return None;
                    }
                    None => signals_open = false,
                },
            }
        }
    }
}
