//! Wire a [`Scheduler`] from [`OrchestratorConfig`] and the embedding
//! application's collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::core::admission::{AdmissionQueue, BrowserWindowLauncher, WindowLauncher};
use crate::core::audit::{AuditSink, InMemoryAuditSink, SharedAuditSink, SharedMemoryAuditSink};
use crate::core::browser::BrowserDriver;
use crate::core::collaborators::{AccountStore, CategoryAction, IdentityProvider};
use crate::core::executor::TaskExecutor;
use crate::core::profile::ProfileProvisioner;
use crate::core::scheduler::{Scheduler, SchedulerContext};
use crate::core::session_pool::SessionPool;
use crate::core::FleetError;
use crate::infra::stealth::DefaultIdentityProvider;
use crate::runtime::TokioSpawner;

/// Collects collaborators, then builds a ready-to-start [`Scheduler`].
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    driver: Option<Arc<dyn BrowserDriver>>,
    store: Option<Arc<dyn AccountStore>>,
    identities: Option<Arc<dyn IdentityProvider>>,
    launcher: Option<Arc<dyn WindowLauncher>>,
    actions: BTreeMap<String, Arc<dyn CategoryAction>>,
}

impl OrchestratorBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            driver: None,
            store: None,
            identities: None,
            launcher: None,
            actions: BTreeMap::new(),
        }
    }

    /// Browser driver. Required.
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn BrowserDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Account store. Required.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Identity provider. Defaults to [`DefaultIdentityProvider`] with the configured pacing.
    #[must_use]
    pub fn identity_provider(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Interactive window launcher. Defaults to [`BrowserWindowLauncher`] on the same driver.
    #[must_use]
    pub fn window_launcher(mut self, launcher: Arc<dyn WindowLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Action for a configured category.
    #[must_use]
    pub fn action(mut self, category: impl Into<String>, action: Arc<dyn CategoryAction>) -> Self {
        self.actions.insert(category.into(), action);
        self
    }

    /// Validate and wire everything. Must run inside a tokio runtime.
    ///
    /// Configured categories without an action are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - `FleetError::InvalidConfig` for an invalid configuration, a missing
    ///   driver or store, an action for an unknown category, or no tokio runtime
    pub fn build(self) -> Result<Scheduler<TokioSpawner>, FleetError> {
        let Self {
            config,
            driver,
            store,
            identities,
            launcher,
            mut actions,
        } = self;

        config
            .validate()
            .map_err(|e| FleetError::InvalidConfig(format!("config invalid: {e}")))?;
        let driver = driver.ok_or_else(|| FleetError::InvalidConfig("browser driver not set".into()))?;
        let store = store.ok_or_else(|| FleetError::InvalidConfig("account store not set".into()))?;
        if let Some(unknown) = actions.keys().find(|name| !config.categories.contains_key(*name)) {
            return Err(FleetError::InvalidConfig(format!(
                "action registered for unknown category `{unknown}`"
            )));
        }

        let identities = identities
            .unwrap_or_else(|| Arc::new(DefaultIdentityProvider::new(config.pacing.clone())));
        let provisioner = Arc::new(ProfileProvisioner::new(
            config.sessions.profile_root.clone(),
            Arc::clone(&store),
            identities,
            config.sessions.blocked_resources.clone(),
        ));
        let sessions = Arc::new(SessionPool::new(
            Arc::clone(&driver),
            Arc::clone(&provisioner),
            config.sessions.mode,
        ));
        let launcher = launcher
            .unwrap_or_else(|| Arc::new(BrowserWindowLauncher::new(driver, provisioner)));

        let mut admission = AdmissionQueue::new(config.admission.max_windows, launcher);
        let mut executor = TaskExecutor::new(config.executor.max_workers, TokioSpawner::try_current()?);

        let trail = (config.audit_capacity > 0).then(|| {
            let trail = Arc::new(Mutex::new(InMemoryAuditSink::new(config.audit_capacity)));
            let sink: SharedAuditSink = Arc::new(Mutex::new(
                Box::new(SharedMemoryAuditSink(Arc::clone(&trail))) as Box<dyn AuditSink>,
            ));
            admission = admission.clone().with_audit(Arc::clone(&sink));
            executor = executor.clone().with_audit(sink);
            trail
        });

        let ctx = SchedulerContext::new(executor, sessions, admission, store);
        let mut scheduler = Scheduler::new(ctx, &config);
        if let Some(trail) = trail {
            scheduler = scheduler.with_audit_trail(trail);
        }

        for (name, category) in &config.categories {
            match actions.remove(name) {
                Some(action) => scheduler.register_category(name, category.clone(), action)?,
                None => warn!(category = %name, "no action registered, category skipped"),
            }
        }

        info!(
            max_workers = config.executor.max_workers,
            max_windows = config.admission.max_windows,
            categories = scheduler.category_names().len(),
            "orchestrator built"
        );
        Ok(scheduler)
    }
}
