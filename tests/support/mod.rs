//! Shared fakes for integration tests: a scriptable browser driver, a
//! scriptable category action, and a harness wiring them to a temp profile root.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use prometheus_fleet::config::PacingConfig;
use prometheus_fleet::core::{
    Account, AccountStore, ActionError, ActionReport, AdmissionQueue, BrowserDriver,
    BrowserSession, BrowserWindowLauncher, CategoryAction, CategorySettings, FleetError,
    LaunchMode, LaunchSpec, ProfileProvisioner, ResourceKind, SessionHandle, SessionMode,
    SessionPool,
};
use prometheus_fleet::infra::{DefaultIdentityProvider, InMemoryAccountStore};

// ============================================================================
// Fake browser
// ============================================================================

/// In-memory stand-in for a browser process/context/page triple.
pub struct FakeSession {
    pub account_id: String,
    pub mode: LaunchMode,
    pub init_script: String,
    connected: AtomicBool,
    context_open: AtomicBool,
    page_closed: AtomicBool,
    closes: AtomicUsize,
    saves: AtomicUsize,
    closed_tx: watch::Sender<bool>,
}

impl FakeSession {
    fn new(spec: &LaunchSpec) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            account_id: spec.account_id.clone(),
            mode: spec.mode.clone(),
            init_script: spec.init_script.clone(),
            connected: AtomicBool::new(true),
            context_open: AtomicBool::new(true),
            page_closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            closed_tx,
        })
    }

    /// The human closed the window (or the process died).
    pub fn kill(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.context_open.store(false, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }

    /// Process dies without the close future firing, as when an event is missed.
    pub fn disconnect_silently(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Only the working page goes away.
    pub fn close_page(&self) {
        self.page_closed.store(true, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.mode, LaunchMode::Interactive { .. })
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_context_open(&self) -> bool {
        self.context_open.load(Ordering::SeqCst)
    }

    fn is_page_closed(&self) -> bool {
        self.page_closed.load(Ordering::SeqCst)
    }

    async fn list_pages(&self) -> Result<usize, FleetError> {
        if self.is_connected() {
            Ok(1)
        } else {
            Err(FleetError::Session("disconnected".into()))
        }
    }

    async fn save_state(&self) -> Result<(), FleetError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), FleetError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.kill();
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Driver recording every launch.
#[derive(Default)]
pub struct FakeDriver {
    launches: Mutex<Vec<Arc<FakeSession>>>,
    specs: Mutex<Vec<LaunchSpec>>,
    fail_automated: AtomicBool,
    fail_interactive: Mutex<HashSet<String>>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> Vec<Arc<FakeSession>> {
        self.launches.lock().clone()
    }

    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.specs.lock().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn automated_for(&self, account_id: &str) -> Vec<Arc<FakeSession>> {
        self.launches
            .lock()
            .iter()
            .filter(|s| s.account_id == account_id && !s.is_interactive())
            .cloned()
            .collect()
    }

    pub fn interactive_for(&self, account_id: &str) -> Vec<Arc<FakeSession>> {
        self.launches
            .lock()
            .iter()
            .filter(|s| s.account_id == account_id && s.is_interactive())
            .cloned()
            .collect()
    }

    pub fn set_fail_automated(&self, fail: bool) {
        self.fail_automated.store(fail, Ordering::SeqCst);
    }

    pub fn fail_interactive_for(&self, account_id: &str) {
        self.fail_interactive.lock().insert(account_id.to_string());
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn BrowserSession>, FleetError> {
        let refuse = match spec.mode {
            LaunchMode::Automated => self.fail_automated.load(Ordering::SeqCst),
            LaunchMode::Interactive { .. } => {
                self.fail_interactive.lock().contains(&spec.account_id)
            }
        };
        if refuse {
            return Err(FleetError::Launch {
                account: spec.account_id.clone(),
                reason: "driver refused".into(),
            });
        }
        let session = FakeSession::new(&spec);
        self.launches.lock().push(Arc::clone(&session));
        self.specs.lock().push(spec);
        Ok(session)
    }
}

// ============================================================================
// Fake action
// ============================================================================

/// What the next `execute` call for an account returns.
#[derive(Debug, Clone)]
pub enum Outcome {
    Done,
    DoneFor(Duration),
    Failed,
    Login,
    Challenge,
    Error,
}

/// Category action driven by a per-account script; defaults to `Done`.
#[derive(Default)]
pub struct ScriptedAction {
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedAction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn push(&self, account_id: &str, outcome: Outcome) {
        self.script
            .lock()
            .entry(account_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, account_id: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == account_id).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategoryAction for ScriptedAction {
    async fn execute(
        &self,
        session: &SessionHandle,
        account_id: &str,
        _store: &dyn AccountStore,
    ) -> Result<ActionReport, ActionError> {
        assert_eq!(session.account_id, account_id);
        self.calls.lock().push(account_id.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = self
            .script
            .lock()
            .get_mut(account_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Done);
        match outcome {
            Outcome::Done => Ok(ActionReport::done()),
            Outcome::DoneFor(wait) => Ok(ActionReport::done_for(wait)),
            Outcome::Failed => Ok(ActionReport::failed()),
            Outcome::Login => Err(ActionError::LoginRequired("login form shown".into())),
            Outcome::Challenge => Err(ActionError::ChallengeDetected("captcha".into())),
            Outcome::Error => Err(ActionError::Other(anyhow::anyhow!("button missing"))),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Temp profile root plus the fakes, ready to build pools and queues from.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub driver: Arc<FakeDriver>,
    pub store: Arc<InMemoryAccountStore>,
    pub provisioner: Arc<ProfileProvisioner>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new();
        let store = Arc::new(InMemoryAccountStore::new());
        let provisioner = Arc::new(ProfileProvisioner::new(
            dir.path(),
            store.clone(),
            Arc::new(DefaultIdentityProvider::new(PacingConfig::default())),
            vec![ResourceKind::Image, ResourceKind::Media, ResourceKind::Font],
        ));
        Self {
            dir,
            driver,
            store,
            provisioner,
        }
    }

    pub fn pool(&self, mode: SessionMode) -> Arc<SessionPool> {
        Arc::new(SessionPool::new(
            self.driver.clone(),
            self.provisioner.clone(),
            mode,
        ))
    }

    pub fn admission(&self, max_windows: usize) -> AdmissionQueue {
        AdmissionQueue::new(
            max_windows,
            Arc::new(BrowserWindowLauncher::new(
                self.driver.clone(),
                self.provisioner.clone(),
            )),
        )
    }

    /// Enabled, unpaused account with every listed category enabled.
    pub fn add_account(&self, id: &str, categories: &[&str]) {
        self.store.insert_account(Account {
            id: id.to_string(),
            username: format!("user-{id}"),
            enabled: true,
            paused: false,
        });
        for category in categories {
            self.store
                .set_category_settings(id, category, CategorySettings::default());
        }
    }
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
