//! Bounded-concurrency task executor with a priority queue.
//!
//! At most `max_workers` tasks run at once. Extra submissions park in a
//! [`PendingQueue`] ordered by priority (lower value first, FIFO on ties).
//! When a task finishes, its slot is handed straight to the head of the queue
//! inside the same critical section, so there is no polling gap between a slot
//! freeing and the next task starting. Running tasks are never preempted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::audit::{record_to, SharedAuditSink};
use crate::core::FleetError;
use crate::infra::queue::PendingQueue;
use crate::runtime::TokioSpawner;

/// Task priority. Lower values are served first once a slot frees.
pub type Priority = i32;

/// Interval at which [`TaskExecutor::wait_for_completion`] re-checks for idleness.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const COMPONENT: &str = "executor";

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn: Send + Sync + 'static {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

type Job = BoxFuture<'static, ()>;

struct ExecutorState {
    running: usize,
    pending: PendingQueue<Job>,
}

#[derive(Default)]
struct ExecutorCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

/// Statistics about executor utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExecutorStats {
    /// Configured concurrency cap.
    pub max_workers: usize,
    /// Tasks currently executing.
    pub running: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Total tasks submitted.
    pub submitted: u64,
    /// Tasks that ran to completion (including ones that panicked).
    pub completed: u64,
    /// Tasks whose body panicked.
    pub failed: u64,
    /// Tasks removed by [`TaskExecutor::clear_queue`].
    pub discarded: u64,
}

struct ExecutorInner<S> {
    max_workers: usize,
    state: Mutex<ExecutorState>,
    counters: ExecutorCounters,
    spawner: S,
    audit: RwLock<Option<SharedAuditSink>>,
}

impl<S: Spawn> ExecutorInner<S> {
    fn launch(self: &Arc<Self>, label: String, job: Job) {
        debug!(task = %label, "starting task");
        record_to(self.audit.read().as_ref(), &label, COMPONENT, "start", None);
        let this = Arc::clone(self);
        self.spawner.spawn(async move {
            job.await;
            this.finish(&label);
        });
    }

    fn finish(self: &Arc<Self>, label: &str) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        record_to(self.audit.read().as_ref(), label, COMPONENT, "complete", None);

        // Release and re-acquire under one lock: the slot goes directly to the queue head.
        let next = {
            let mut state = self.state.lock();
            state.running -= 1;
            let next = state.pending.pop();
            if next.is_some() {
                state.running += 1;
            }
            next
        };

        if let Some(task) = next {
            debug!(task = %task.label, priority = task.priority, "woke queued task");
            self.launch(task.label, task.job);
        }
    }
}

/// Bounded-concurrency executor with a priority-ordered pending queue.
///
/// Cheap to clone; clones share the same slots and queue.
pub struct TaskExecutor<S = TokioSpawner> {
    inner: Arc<ExecutorInner<S>>,
}

impl<S> Clone for TaskExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Spawn> TaskExecutor<S> {
    /// Create an executor with `max_workers` slots (at least one).
    pub fn new(max_workers: usize, spawner: S) -> Self {
        let max_workers = max_workers.max(1);
        info!(max_workers, "task executor initialized");
        Self {
            inner: Arc::new(ExecutorInner {
                max_workers,
                state: Mutex::new(ExecutorState {
                    running: 0,
                    pending: PendingQueue::new(),
                }),
                counters: ExecutorCounters::default(),
                spawner,
                audit: RwLock::new(None),
            }),
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(self, audit: SharedAuditSink) -> Self {
        *self.inner.audit.write() = Some(audit);
        self
    }

    /// Submit a task and return a handle resolving to its output.
    ///
    /// Starts immediately if a slot is free, otherwise queues by priority.
    /// Dropping the handle does not cancel the task.
    pub fn submit<F, T>(&self, label: impl Into<String>, priority: Priority, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_label = label.clone();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            if outcome.is_err() {
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(task = %task_label, "task panicked");
            }
            // The caller may have dropped its handle; nothing to report then.
            let _ = tx.send(outcome.map_err(|_| ()));
        });

        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let start_now = {
            let mut state = self.inner.state.lock();
            if state.running < self.inner.max_workers {
                state.running += 1;
                Some(job)
            } else {
                state.pending.push(priority, label.clone(), job);
                debug!(task = %label, priority, queued = state.pending.len(), "task queued");
                None
            }
        };

        if let Some(job) = start_now {
            self.inner.launch(label.clone(), job);
        }

        TaskHandle { label, rx }
    }

    /// Submit a task and wait for its output.
    ///
    /// # Errors
    ///
    /// - `FleetError::TaskPanicked` if the task body panicked
    /// - `FleetError::TaskDiscarded` if the task was cleared from the queue before starting
    pub async fn run<F, T>(
        &self,
        label: impl Into<String>,
        priority: Priority,
        task: F,
    ) -> Result<T, FleetError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(label, priority, task).await
    }

    /// Poll until nothing is running or queued, or `timeout` elapses.
    ///
    /// Never cancels anything; returns whether idleness was reached in time.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Discard every queued-but-not-started task; running tasks are untouched.
    ///
    /// Callers awaiting a discarded task receive `FleetError::TaskDiscarded`.
    pub fn clear_queue(&self) -> usize {
        let discarded = self.inner.state.lock().pending.drain_all();
        let count = discarded.len();
        if count > 0 {
            self.inner
                .counters
                .discarded
                .fetch_add(count as u64, Ordering::Relaxed);
            let audit = self.inner.audit.read();
            for task in &discarded {
                record_to(audit.as_ref(), &task.label, COMPONENT, "discard", None);
            }
            warn!(count, "discarded queued tasks");
        }
        // Jobs drop here, outside the lock, closing their result channels.
        drop(discarded);
        count
    }

    /// True when no task is running and none is queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.running == 0 && state.pending.is_empty()
    }

    /// Number of tasks currently executing.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Number of tasks waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Configured concurrency cap.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    /// Get current executor statistics.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let (running, queued) = {
            let state = self.inner.state.lock();
            (state.running, state.pending.len())
        };
        let c = &self.inner.counters;
        ExecutorStats {
            max_workers: self.inner.max_workers,
            running,
            queued,
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Future resolving to a submitted task's output.
pub struct TaskHandle<T> {
    label: String,
    rx: oneshot::Receiver<Result<T, ()>>,
}

impl<T> TaskHandle<T> {
    /// Label the task was submitted with.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, FleetError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(()))) => {
                Poll::Ready(Err(FleetError::TaskPanicked(this.label.clone())))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(FleetError::TaskDiscarded(this.label.clone()))),
        }
    }
}
