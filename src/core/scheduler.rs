//! Periodic category scheduling over a fleet of accounts.
//!
//! A [`Scheduler`] owns one [`CategoryLoop`] per registered category, a
//! [`Watchdog`] over the admission queue, and the [`ShutdownCoordinator`].
//! Every loop shares one [`SchedulerContext`]: the executor, session pool,
//! admission queue, account store, and per-(account, category) deadlines.
//!
//! Accounts that hit a login wall or an anti-bot challenge are suspended: the
//! pause flag is set in the store, the automated session is evicted, and the
//! account is queued for an interactive window. When that window closes the
//! pause flag is cleared and the account rejoins normal scheduling.

pub mod category_loop;
pub mod shutdown;
pub mod timing;
pub mod watchdog;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CategoryConfig, OrchestratorConfig};
use crate::core::admission::{AdmissionQueue, AdmissionReason, AdmissionSnapshot, WindowObserver};
use crate::core::audit::{AuditEvent, InMemoryAuditSink};
use crate::core::collaborators::{AccountStore, CategoryAction};
use crate::core::executor::{ExecutorStats, Spawn, TaskExecutor};
use crate::core::session_pool::SessionPool;
use crate::core::FleetError;
use crate::runtime::TokioSpawner;

pub use category_loop::{AccountOutcome, CategoryLoop, CycleReport};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase, ShutdownReport};
pub use timing::TimingState;
pub use watchdog::{Watchdog, WatchdogTick};

/// Shared collaborators handed to every category loop.
pub struct SchedulerContext<S: Spawn = TokioSpawner> {
    /// Bounded executor all account tasks run on.
    pub executor: TaskExecutor<S>,
    /// Automated sessions.
    pub sessions: Arc<SessionPool>,
    /// Interactive window queue.
    pub admission: AdmissionQueue,
    /// Account storage.
    pub store: Arc<dyn AccountStore>,
    /// Next-eligible deadlines.
    pub timing: Arc<TimingState>,
    /// Fires once shutdown starts.
    pub cancel: CancellationToken,
    suspending: Mutex<HashSet<String>>,
}

impl<S: Spawn> SchedulerContext<S> {
    /// Context with empty deadlines and a fresh cancellation token.
    pub fn new(
        executor: TaskExecutor<S>,
        sessions: Arc<SessionPool>,
        admission: AdmissionQueue,
        store: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            executor,
            sessions,
            admission,
            store,
            timing: Arc::new(TimingState::new()),
            cancel: CancellationToken::new(),
            suspending: Mutex::new(HashSet::new()),
        }
    }

    /// Whether the account belongs to a human right now: being suspended,
    /// or queued, opening, or active in the admission queue.
    #[must_use]
    pub fn is_suspended(&self, account_id: &str) -> bool {
        self.suspending.lock().contains(account_id) || self.admission.is_tracked(account_id)
    }

    /// Hand an account over to a human.
    ///
    /// The account is marked before anything awaits, so a task that gets the
    /// account's lock ahead of the eviction still sees it as suspended. Then:
    /// pause, evict the automated session (waits for the lock), queue the
    /// window. The mark is lifted only once the admission queue tracks the
    /// account.
    pub async fn suspend(&self, account_id: &str, reason: AdmissionReason) {
        warn!(account = %account_id, %reason, "account needs manual intervention");
        self.suspending.lock().insert(account_id.to_string());
        if let Err(e) = self.store.set_pause(account_id, true).await {
            warn!(account = %account_id, error = %e, "failed to set pause flag");
        }
        self.sessions.evict(account_id).await;
        self.admission.enqueue(account_id, reason, true);
        self.suspending.lock().remove(account_id);
    }
}

/// Clears the pause flag once an account's interactive window closes.
struct PauseReleaser {
    store: Arc<dyn AccountStore>,
}

#[async_trait]
impl WindowObserver for PauseReleaser {
    async fn on_window_closed(&self, account_id: &str, reason: &AdmissionReason) {
        match self.store.set_pause(account_id, false).await {
            Ok(()) => info!(account = %account_id, %reason, "interactive window closed, account resumed"),
            Err(e) => warn!(account = %account_id, error = %e, "failed to clear pause flag"),
        }
    }
}

/// Point-in-time view of the whole scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Executor utilization.
    pub executor: ExecutorStats,
    /// Interactive window queue.
    pub admission: AdmissionSnapshot,
    /// Resident automated sessions.
    pub resident_sessions: usize,
    /// Tracked (account, category) deadlines.
    pub tracked_deadlines: usize,
    /// Registered categories, by name.
    pub categories: Vec<String>,
    /// Whether shutdown has started.
    pub shutting_down: bool,
}

/// Top-level orchestrator.
pub struct Scheduler<S: Spawn = TokioSpawner> {
    ctx: Arc<SchedulerContext<S>>,
    categories: BTreeMap<String, CategoryLoop<S>>,
    watchdog: Watchdog,
    shutdown: Arc<ShutdownCoordinator<S>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    audit_trail: Option<Arc<Mutex<InMemoryAuditSink>>>,
}

impl<S: Spawn> Scheduler<S> {
    /// Wire a scheduler from its collaborators. Registers the pause-releasing
    /// window observer on the admission queue.
    pub fn new(ctx: SchedulerContext<S>, config: &OrchestratorConfig) -> Self {
        ctx.admission.set_observer(Arc::new(PauseReleaser {
            store: Arc::clone(&ctx.store),
        }));
        let ctx = Arc::new(ctx);
        let watchdog = Watchdog::new(
            ctx.admission.clone(),
            config.watchdog.tick(),
            ctx.cancel.clone(),
        );
        let shutdown = Arc::new(ShutdownCoordinator::new(
            ctx.executor.clone(),
            Arc::clone(&ctx.sessions),
            ctx.admission.clone(),
            ctx.cancel.clone(),
            config.shutdown.drain_timeout(),
        ));
        Self {
            ctx,
            categories: BTreeMap::new(),
            watchdog,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            audit_trail: None,
        }
    }

    /// Keep a handle to the in-memory audit trail the components record into.
    #[must_use]
    pub fn with_audit_trail(mut self, trail: Arc<Mutex<InMemoryAuditSink>>) -> Self {
        self.audit_trail = Some(trail);
        self
    }

    /// Recorded audit events, oldest first. Empty when auditing is off.
    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_trail
            .as_ref()
            .map(|trail| trail.lock().events())
            .unwrap_or_default()
    }

    /// Add a category. Replaces an existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::InvalidConfig` when the category configuration
    /// does not validate.
    pub fn register_category(
        &mut self,
        name: &str,
        config: CategoryConfig,
        action: Arc<dyn CategoryAction>,
    ) -> Result<(), FleetError> {
        config
            .validate()
            .map_err(|e| FleetError::InvalidConfig(format!("category `{name}` invalid: {e}")))?;
        let category = CategoryLoop::new(name, config, action, Arc::clone(&self.ctx));
        if self.categories.insert(name.to_string(), category).is_some() {
            warn!(category = %name, "category re-registered, previous action replaced");
        }
        Ok(())
    }

    /// Spawn every enabled category loop and the watchdog.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::InvalidConfig` if the scheduler was already started
    /// or has already been shut down.
    pub fn start(&self) -> Result<usize, FleetError> {
        if self.ctx.cancel.is_cancelled() {
            return Err(FleetError::InvalidConfig("scheduler already shut down".into()));
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(FleetError::InvalidConfig("scheduler already started".into()));
        }

        let mut started = 0;
        for (name, category) in &self.categories {
            if !category.config().enabled {
                info!(category = %name, "category disabled, not starting");
                continue;
            }
            tasks.push(tokio::spawn(category.clone().run()));
            started += 1;
        }
        tasks.push(tokio::spawn(self.watchdog.clone().run()));
        info!(categories = started, "scheduler started");
        Ok(started)
    }

    /// Wait for every spawned loop to exit.
    pub async fn join(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }

    /// The loop registered under `name`.
    #[must_use]
    pub fn category_loop(&self, name: &str) -> Option<&CategoryLoop<S>> {
        self.categories.get(name)
    }

    /// Registered category names.
    #[must_use]
    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// The admission watchdog.
    #[must_use]
    pub const fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Shared shutdown coordinator.
    #[must_use]
    pub fn shutdown_coordinator(&self) -> Arc<ShutdownCoordinator<S>> {
        Arc::clone(&self.shutdown)
    }

    /// Shared context.
    #[must_use]
    pub fn context(&self) -> &SchedulerContext<S> {
        &self.ctx
    }

    /// Next-eligible deadlines.
    #[must_use]
    pub fn timing(&self) -> &TimingState {
        &self.ctx.timing
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Current state of every component.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            executor: self.ctx.executor.stats(),
            admission: self.ctx.admission.snapshot(),
            resident_sessions: self.ctx.sessions.resident_count(),
            tracked_deadlines: self.ctx.timing.len(),
            categories: self.category_names(),
            shutting_down: self.ctx.cancel.is_cancelled(),
        }
    }
}
