//! Admission control for human-visible browser windows.
//!
//! Accounts that need a human (failed login, anti-bot challenge) are queued
//! here. At most `max_windows` interactive windows are open at once; the rest
//! wait FIFO. An account is in at most one of queued, opening, or active.
//!
//! Close detection uses [`BrowserSession::closed`]: each opened window gets a
//! watcher task that finalizes the window the moment the session dies. A
//! periodic [`AdmissionQueue::heal`] scan catches windows whose process
//! disconnected without the watcher noticing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::audit::{record_to, SharedAuditSink};
use crate::core::browser::{BrowserDriver, BrowserSession, LaunchMode};
use crate::core::profile::ProfileProvisioner;
use crate::core::FleetError;
use crate::util::clock::now_ms;

const COMPONENT: &str = "admission";

/// Why an account needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    /// Session logged out; credentials must be entered manually.
    LoginFailed,
    /// Anti-bot challenge on screen.
    ChallengeDetected,
    /// Operator-requested window.
    Manual(String),
}

impl fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginFailed => write!(f, "login failed"),
            Self::ChallengeDetected => write!(f, "challenge detected"),
            Self::Manual(note) => write!(f, "manual: {note}"),
        }
    }
}

/// A queued request for an interactive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionEntry {
    /// Account needing attention.
    pub account_id: String,
    /// Why.
    pub reason: AdmissionReason,
    /// Let the driver close the window once the condition is resolved.
    pub auto_close: bool,
    /// Enqueue time, ms since epoch.
    pub enqueued_at_ms: u128,
}

/// An open interactive window.
#[derive(Clone)]
pub struct ActiveWindow {
    /// Unique id of this window.
    pub window_id: Uuid,
    /// Account shown in the window.
    pub account_id: String,
    /// Why it was opened.
    pub reason: AdmissionReason,
    /// Open time, ms since epoch.
    pub opened_at_ms: u128,
    session: Arc<dyn BrowserSession>,
}

impl fmt::Debug for ActiveWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveWindow")
            .field("window_id", &self.window_id)
            .field("account_id", &self.account_id)
            .field("reason", &self.reason)
            .field("opened_at_ms", &self.opened_at_ms)
            .finish_non_exhaustive()
    }
}

/// Opens interactive windows.
#[async_trait]
pub trait WindowLauncher: Send + Sync {
    /// Open a human-visible window for the entry's account.
    async fn open(&self, entry: &AdmissionEntry) -> Result<Arc<dyn BrowserSession>, FleetError>;
}

/// Notified whenever a window closes (or fails to open).
#[async_trait]
pub trait WindowObserver: Send + Sync {
    /// Called once per closed window, after bookkeeping is released.
    async fn on_window_closed(&self, account_id: &str, reason: &AdmissionReason);
}

/// [`WindowLauncher`] that starts a headed browser on the account's own profile.
pub struct BrowserWindowLauncher {
    driver: Arc<dyn BrowserDriver>,
    provisioner: Arc<ProfileProvisioner>,
}

impl BrowserWindowLauncher {
    /// Build a launcher sharing the pool's driver and provisioner.
    pub fn new(driver: Arc<dyn BrowserDriver>, provisioner: Arc<ProfileProvisioner>) -> Self {
        Self {
            driver,
            provisioner,
        }
    }
}

#[async_trait]
impl WindowLauncher for BrowserWindowLauncher {
    async fn open(&self, entry: &AdmissionEntry) -> Result<Arc<dyn BrowserSession>, FleetError> {
        let mode = LaunchMode::Interactive {
            reason: entry.reason.to_string(),
            auto_close: entry.auto_close,
        };
        let spec = self.provisioner.prepare(&entry.account_id, mode).await?;
        self.driver.launch(spec).await
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    /// Window cap.
    pub max_windows: usize,
    /// Queued accounts, FIFO order.
    pub queued: Vec<String>,
    /// Accounts whose window is being opened.
    pub opening: Vec<String>,
    /// Accounts with an open window.
    pub active: Vec<String>,
}

#[derive(Default)]
struct AdmissionState {
    queue: VecDeque<AdmissionEntry>,
    opening: HashSet<String>,
    active: HashMap<String, ActiveWindow>,
}

impl AdmissionState {
    fn is_tracked(&self, account_id: &str) -> bool {
        self.active.contains_key(account_id)
            || self.opening.contains(account_id)
            || self.queue.iter().any(|e| e.account_id == account_id)
    }

    fn occupied(&self) -> usize {
        self.active.len() + self.opening.len()
    }
}

struct AdmissionInner {
    max_windows: usize,
    state: Mutex<AdmissionState>,
    draining: AtomicBool,
    closed: AtomicBool,
    launcher: Arc<dyn WindowLauncher>,
    observer: RwLock<Option<Arc<dyn WindowObserver>>>,
    audit: RwLock<Option<SharedAuditSink>>,
}

/// Admission-controlled queue of interactive windows.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<AdmissionInner>,
}

impl AdmissionQueue {
    /// Create a queue allowing `max_windows` concurrent windows (at least one).
    pub fn new(max_windows: usize, launcher: Arc<dyn WindowLauncher>) -> Self {
        Self {
            inner: Arc::new(AdmissionInner {
                max_windows: max_windows.max(1),
                state: Mutex::new(AdmissionState::default()),
                draining: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                launcher,
                observer: RwLock::new(None),
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

    /// Register the close-callback.
    pub fn set_observer(&self, observer: Arc<dyn WindowObserver>) {
        *self.inner.observer.write() = Some(observer);
    }

    /// Window cap.
    #[must_use]
    pub fn max_windows(&self) -> usize {
        self.inner.max_windows
    }

    /// Request a window for `account_id`.
    ///
    /// Returns the 1-based queue position, or `None` if the account is
    /// already queued, opening, or active, or the queue was closed by
    /// [`AdmissionQueue::close_all`]. Triggers a background drain.
    pub fn enqueue(
        &self,
        account_id: &str,
        reason: AdmissionReason,
        auto_close: bool,
    ) -> Option<usize> {
        let position = {
            let mut state = self.inner.state.lock();
            if self.is_closed() {
                debug!(account = %account_id, "admission queue closed, ignoring enqueue");
                return None;
            }
            if state.is_tracked(account_id) {
                debug!(account = %account_id, "already queued or active, ignoring enqueue");
                return None;
            }
            state.queue.push_back(AdmissionEntry {
                account_id: account_id.to_string(),
                reason: reason.clone(),
                auto_close,
                enqueued_at_ms: now_ms(),
            });
            state.queue.len()
        };

        info!(account = %account_id, %reason, position, "queued interactive window");
        self.audit(account_id, "enqueue", Some(reason.to_string()));
        self.spawn_drain();
        Some(position)
    }

    fn spawn_drain(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.drain().await;
        });
    }

    /// Open queued windows while capacity allows.
    ///
    /// Single-flight: returns immediately if another drain is running.
    pub async fn drain(&self) {
        loop {
            if self.is_closed() {
                return;
            }
            if self.inner.draining.swap(true, Ordering::AcqRel) {
                debug!("drain already in progress");
                return;
            }
            self.drain_pass().await;
            self.inner.draining.store(false, Ordering::Release);

            // Work that arrived between the last pop and clearing the flag.
            if !self.can_admit() {
                break;
            }
        }
    }

    async fn drain_pass(&self) {
        loop {
            let entry = {
                let mut state = self.inner.state.lock();
                if self.is_closed() || state.occupied() >= self.inner.max_windows {
                    break;
                }
                let Some(entry) = state.queue.pop_front() else {
                    break;
                };
                state.opening.insert(entry.account_id.clone());
                entry
            };
            self.open_window(entry).await;
        }
    }

    async fn open_window(&self, entry: AdmissionEntry) {
        let account_id = entry.account_id.clone();
        match self.inner.launcher.open(&entry).await {
            Ok(session) => {
                let window = ActiveWindow {
                    window_id: Uuid::new_v4(),
                    account_id: account_id.clone(),
                    reason: entry.reason.clone(),
                    opened_at_ms: now_ms(),
                    session: Arc::clone(&session),
                };
                let window_id = window.window_id;

                // Recorded before the watcher starts, so a window that dies
                // instantly is still found and finalized. The closed flag is
                // read under the same lock `close_all` drains with.
                let recorded = {
                    let mut state = self.inner.state.lock();
                    state.opening.remove(&account_id);
                    if self.is_closed() {
                        false
                    } else {
                        state.active.insert(account_id.clone(), window);
                        true
                    }
                };
                if !recorded {
                    if let Err(e) = session.close().await {
                        debug!(account = %account_id, error = %e, "error while closing late window");
                    }
                    info!(account = %account_id, "closed window that finished opening after teardown");
                    return;
                }
                info!(account = %account_id, window = %window_id, reason = %entry.reason, "opened interactive window");
                self.audit(&account_id, "window_open", Some(entry.reason.to_string()));

                let this = self.clone();
                tokio::spawn(async move {
                    session.closed().await;
                    if this.finalize_close(&account_id, Some(window_id)).await {
                        this.spawn_drain();
                    }
                });
            }
            Err(e) => {
                warn!(account = %account_id, error = %e, "failed to open interactive window");
                self.inner.state.lock().opening.remove(&account_id);
                if self.is_closed() {
                    return;
                }
                self.audit(&account_id, "window_failed", Some(e.to_string()));
                self.notify_closed(&account_id, &entry.reason).await;
            }
        }
    }

    /// Release bookkeeping for a window and notify the observer.
    ///
    /// With `window_id`, only that incarnation is finalized. Returns whether a
    /// window was removed.
    async fn finalize_close(&self, account_id: &str, window_id: Option<Uuid>) -> bool {
        let window = {
            let mut state = self.inner.state.lock();
            let matches = state
                .active
                .get(account_id)
                .is_some_and(|w| window_id.is_none_or(|id| w.window_id == id));
            if matches {
                state.active.remove(account_id)
            } else {
                None
            }
        };
        let Some(window) = window else {
            return false;
        };

        if window.session.is_connected() {
            if let Err(e) = window.session.save_state().await {
                warn!(account = %account_id, error = %e, "failed to persist window state");
            }
        }
        if let Err(e) = window.session.close().await {
            debug!(account = %account_id, error = %e, "error while closing window");
        }

        info!(account = %account_id, window = %window.window_id, "interactive window closed");
        self.audit(account_id, "window_close", Some(window.reason.to_string()));
        self.notify_closed(account_id, &window.reason).await;
        true
    }

    async fn notify_closed(&self, account_id: &str, reason: &AdmissionReason) {
        let observer = self.inner.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_window_closed(account_id, reason).await;
        }
    }

    /// Close the account's window (if open), notify, and keep draining.
    pub async fn close_window(&self, account_id: &str) -> bool {
        let closed = self.finalize_close(account_id, None).await;
        if closed {
            self.drain().await;
        }
        closed
    }

    /// Finalize windows whose browser process is gone. Returns how many.
    pub async fn heal(&self) -> usize {
        let dead: Vec<(String, Uuid)> = {
            let state = self.inner.state.lock();
            state
                .active
                .values()
                .filter(|w| !w.session.is_connected())
                .map(|w| (w.account_id.clone(), w.window_id))
                .collect()
        };

        let mut healed = 0;
        for (account_id, window_id) in dead {
            if self.finalize_close(&account_id, Some(window_id)).await {
                warn!(account = %account_id, "healed disconnected interactive window");
                healed += 1;
            }
        }
        if healed > 0 {
            self.drain().await;
        }
        healed
    }

    /// Force-close every active window and empty the queue.
    ///
    /// Closes the queue for good: later enqueues are ignored, and a window
    /// whose launch is still in flight is closed as soon as it opens. The
    /// observer is not notified. Returns `(windows_closed, entries_dropped)`,
    /// where in-flight launches count as dropped entries.
    pub async fn close_all(&self) -> (usize, usize) {
        self.inner.closed.store(true, Ordering::Release);
        let (windows, dropped) = {
            let mut state = self.inner.state.lock();
            let dropped = state.queue.len() + state.opening.len();
            state.queue.clear();
            state.opening.clear();
            let windows: Vec<ActiveWindow> = state.active.drain().map(|(_, w)| w).collect();
            (windows, dropped)
        };

        for window in &windows {
            if window.session.is_connected() {
                if let Err(e) = window.session.save_state().await {
                    warn!(account = %window.account_id, error = %e, "failed to persist window state");
                }
            }
            if let Err(e) = window.session.close().await {
                debug!(account = %window.account_id, error = %e, "error while closing window");
            }
        }
        info!(windows = windows.len(), dropped, "closed all interactive windows");
        (windows.len(), dropped)
    }

    /// Whether [`AdmissionQueue::close_all`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether the account is queued, opening, or active.
    #[must_use]
    pub fn is_tracked(&self, account_id: &str) -> bool {
        self.inner.state.lock().is_tracked(account_id)
    }

    /// Whether the account has an open window.
    #[must_use]
    pub fn is_active(&self, account_id: &str) -> bool {
        self.inner.state.lock().active.contains_key(account_id)
    }

    /// Number of queued entries.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Number of open windows.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// Queue is non-empty and a window slot is free.
    #[must_use]
    pub fn can_admit(&self) -> bool {
        let state = self.inner.state.lock();
        !state.queue.is_empty() && state.occupied() < self.inner.max_windows
    }

    /// Current queue contents.
    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.inner.state.lock();
        let mut active: Vec<String> = state.active.keys().cloned().collect();
        active.sort();
        let mut opening: Vec<String> = state.opening.iter().cloned().collect();
        opening.sort();
        AdmissionSnapshot {
            max_windows: self.inner.max_windows,
            queued: state.queue.iter().map(|e| e.account_id.clone()).collect(),
            opening,
            active,
        }
    }

    fn audit(&self, account_id: &str, action: &str, detail: Option<String>) {
        record_to(self.inner.audit.read().as_ref(), account_id, COMPONENT, action, detail);
    }
}
