//! One periodic loop per automation category.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::CategoryConfig;
use crate::core::admission::AdmissionReason;
use crate::core::collaborators::{Account, CategoryAction};
use crate::core::executor::Spawn;
use crate::core::scheduler::SchedulerContext;
use crate::core::{ActionError, FleetError};
use crate::util::clock::now_ms;
use crate::util::jitter::remaining;

/// Tally of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Accounts returned by the store.
    pub listed: usize,
    /// Accounts that passed every eligibility filter.
    pub eligible: usize,
    /// Tasks submitted to the executor.
    pub dispatched: usize,
    /// Tasks whose action succeeded.
    pub succeeded: usize,
    /// Tasks that failed (action failure, session error, panic, discard).
    pub failed: usize,
    /// Accounts handed to the admission queue.
    pub suspended: usize,
    /// Tasks that found their account suspended after acquiring the session.
    pub skipped: usize,
}

/// How a single account task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Action reported success.
    Succeeded,
    /// Action or session failed; backoff applied.
    Failed,
    /// Login or challenge; account paused and queued for a human.
    Suspended,
    /// Account became suspended before the action ran.
    Skipped,
}

/// Periodic dispatcher for one category.
pub struct CategoryLoop<S: Spawn> {
    name: Arc<str>,
    config: CategoryConfig,
    action: Arc<dyn CategoryAction>,
    ctx: Arc<SchedulerContext<S>>,
}

impl<S: Spawn> Clone for CategoryLoop<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            action: Arc::clone(&self.action),
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S: Spawn> CategoryLoop<S> {
    pub(crate) fn new(
        name: &str,
        config: CategoryConfig,
        action: Arc<dyn CategoryAction>,
        ctx: Arc<SchedulerContext<S>>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            config,
            action,
            ctx,
        }
    }

    /// Category name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category configuration.
    #[must_use]
    pub const fn config(&self) -> &CategoryConfig {
        &self.config
    }

    /// Repeat cycles until the scheduler's cancellation token fires.
    ///
    /// Each sleep is the jittered interval minus the time the cycle took.
    pub async fn run(self) {
        let cancel = self.ctx.cancel.clone();
        info!(category = %self.name, priority = self.config.priority, "category loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            match self.run_cycle(now_ms()).await {
                Ok(report) => info!(
                    category = %self.name,
                    eligible = report.eligible,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    suspended = report.suspended,
                    "cycle finished"
                ),
                Err(e) => error!(category = %self.name, error = %e, "cycle failed"),
            }

            let wait = remaining(self.config.interval().sample(), started.elapsed());
            debug!(category = %self.name, wait_ms = wait.as_millis(), "sleeping until next cycle");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
        }
        info!(category = %self.name, "category loop stopped");
    }

    /// Accounts that may run this category at `now_ms`.
    ///
    /// Excludes paused accounts, accounts being suspended or held by the admission queue, accounts
    /// whose deadline has not elapsed, and accounts without enabled settings.
    ///
    /// # Errors
    ///
    /// Propagates account store failures.
    pub async fn select_eligible(&self, now_ms: u128) -> Result<(usize, Vec<Account>), FleetError> {
        let accounts = self.ctx.store.list_enabled_accounts().await?;
        let listed = accounts.len();
        let mut eligible = Vec::with_capacity(listed);
        for account in accounts {
            if !account.enabled || account.paused {
                continue;
            }
            if self.ctx.is_suspended(&account.id) {
                continue;
            }
            if !self.ctx.timing.is_eligible(&account.id, &self.name, now_ms) {
                continue;
            }
            let settings = self
                .ctx
                .store
                .get_category_settings(&account.id, &self.name)
                .await?;
            if settings.is_some_and(|s| s.enabled) {
                eligible.push(account);
            }
        }
        Ok((listed, eligible))
    }

    /// One pass: select, batch, dispatch, tally.
    ///
    /// # Errors
    ///
    /// Fails only if the account list cannot be read; per-account failures are
    /// counted, never propagated.
    pub async fn run_cycle(&self, now_ms: u128) -> Result<CycleReport, FleetError> {
        let (listed, eligible) = self.select_eligible(now_ms).await?;
        let mut report = CycleReport {
            listed,
            eligible: eligible.len(),
            ..CycleReport::default()
        };

        for (index, batch) in eligible.chunks(self.config.batch_size).enumerate() {
            if self.ctx.cancel.is_cancelled() {
                debug!(category = %self.name, "shutdown requested, not dispatching further batches");
                break;
            }
            if index > 0 {
                tokio::select! {
                    () = self.ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.batch_pause().sample()) => {}
                }
            }

            let handles: Vec<_> = batch
                .iter()
                .map(|account| {
                    let label = format!("{}:{}", self.name, account.id);
                    self.ctx.executor.submit(
                        label,
                        self.config.priority,
                        self.clone().run_account(account.id.clone()),
                    )
                })
                .collect();
            report.dispatched += handles.len();

            for (account, result) in batch.iter().zip(join_all(handles).await) {
                match result {
                    Ok(AccountOutcome::Succeeded) => report.succeeded += 1,
                    Ok(AccountOutcome::Failed) => report.failed += 1,
                    Ok(AccountOutcome::Suspended) => report.suspended += 1,
                    Ok(AccountOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(category = %self.name, account = %account.id, error = %e, "account task did not complete");
                    }
                }
            }
        }
        Ok(report)
    }

    /// The unit of work submitted to the executor for one account.
    ///
    /// Suspension is checked before taking the account's lock and again once
    /// it is held, so no automated browser is ever created for an account
    /// that belongs to a human.
    async fn run_account(self, account_id: String) -> AccountOutcome {
        let ctx = &self.ctx;
        if ctx.is_suspended(&account_id) {
            debug!(category = %self.name, account = %account_id, "account suspended while queued, skipping");
            return AccountOutcome::Skipped;
        }

        let lock = ctx.sessions.lock_account(&account_id).await;
        // Another category may have suspended the account while we waited.
        if ctx.is_suspended(&account_id) {
            debug!(category = %self.name, account = %account_id, "account suspended, skipping");
            return AccountOutcome::Skipped;
        }

        let lease = match ctx.sessions.checkout(lock).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(category = %self.name, account = %account_id, error = %e, "could not obtain session");
                ctx.timing
                    .defer(&account_id, &self.name, now_ms(), self.config.failure_backoff());
                return AccountOutcome::Failed;
            }
        };

        debug!(category = %self.name, account = %account_id, session = %lease.id, "running action");
        let result = self
            .action
            .execute(&lease, &account_id, ctx.store.as_ref())
            .await;
        // Before the lease drops: in manual mode the next holder must get a fresh session.
        ctx.sessions.release_context(&account_id).await;
        drop(lease);

        let now = now_ms();
        match result {
            Ok(report) if report.success => {
                let wait = report.wait_time.unwrap_or_else(|| self.config.default_wait());
                ctx.timing.defer(&account_id, &self.name, now, wait);
                debug!(category = %self.name, account = %account_id, wait_secs = wait.as_secs(), "action succeeded");
                AccountOutcome::Succeeded
            }
            Ok(report) => {
                let wait = report
                    .wait_time
                    .unwrap_or_else(|| self.config.failure_backoff());
                ctx.timing.defer(&account_id, &self.name, now, wait);
                warn!(category = %self.name, account = %account_id, "action reported failure");
                AccountOutcome::Failed
            }
            Err(e) if e.needs_intervention() => {
                let reason = match e {
                    ActionError::ChallengeDetected(_) => AdmissionReason::ChallengeDetected,
                    _ => AdmissionReason::LoginFailed,
                };
                ctx.suspend(&account_id, reason).await;
                AccountOutcome::Suspended
            }
            Err(e) => {
                ctx.timing
                    .defer(&account_id, &self.name, now, self.config.failure_backoff());
                warn!(category = %self.name, account = %account_id, error = %e, "action failed");
                AccountOutcome::Failed
            }
        }
    }
}
