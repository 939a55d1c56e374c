//! Long-lived browser sessions, one per account.
//!
//! `get_context` hands out a [`SessionLease`]: the resident [`SessionHandle`]
//! for the account plus exclusive ownership of it until the lease drops. A
//! resident handle that fails its health check is replaced transparently.
//!
//! Two release policies exist:
//! - [`SessionMode::Persistent`]: handles stay resident across tasks and are
//!   only torn down by [`SessionPool::close_all`] or [`SessionPool::evict`].
//! - [`SessionMode::Manual`]: handles are closed as soon as they are released.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::browser::{BrowserDriver, BrowserSession, LaunchMode};
use crate::core::profile::ProfileProvisioner;
use crate::core::FleetError;
use crate::util::clock::now_ms;

/// Upper bound on the liveness probe; a hung probe counts as a failed check.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Release policy for pooled sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Keep sessions resident for reuse.
    #[default]
    Persistent,
    /// Close sessions immediately on release.
    Manual,
}

/// A live session bound to one account. Never mutated; replaced when unhealthy.
#[derive(Clone)]
pub struct SessionHandle {
    /// Unique id of this incarnation.
    pub id: Uuid,
    /// Owning account.
    pub account_id: String,
    /// Persistent profile directory.
    pub profile_dir: PathBuf,
    /// Creation time, ms since epoch.
    pub created_at_ms: u128,
    session: Arc<dyn BrowserSession>,
}

impl SessionHandle {
    /// The underlying browser session.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn BrowserSession> {
        &self.session
    }

    /// Process connected, context open, page alive, and the page listing answers.
    pub async fn is_healthy(&self) -> bool {
        let s = &self.session;
        if !s.is_connected() || !s.is_context_open() || s.is_page_closed() {
            return false;
        }
        matches!(
            tokio::time::timeout(HEALTH_PROBE_TIMEOUT, s.list_pages()).await,
            Ok(Ok(_))
        )
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("profile_dir", &self.profile_dir)
            .field("created_at_ms", &self.created_at_ms)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of an account's session until dropped.
pub struct SessionLease {
    handle: SessionHandle,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    /// The leased handle.
    #[must_use]
    pub const fn handle(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Deref for SessionLease {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

/// The account's exclusive lock, held before any session exists.
///
/// Obtained from [`SessionPool::lock_account`] and turned into a
/// [`SessionLease`] by [`SessionPool::checkout`]. Dropping it without a
/// checkout creates nothing.
pub struct AccountLock {
    account_id: String,
    guard: OwnedMutexGuard<()>,
}

impl AccountLock {
    /// Account this lock belongs to.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

/// Pool of per-account browser sessions.
pub struct SessionPool {
    driver: Arc<dyn BrowserDriver>,
    provisioner: Arc<ProfileProvisioner>,
    mode: SessionMode,
    handles: RwLock<HashMap<String, SessionHandle>>,
    leases: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionPool {
    /// Create an empty pool.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        provisioner: Arc<ProfileProvisioner>,
        mode: SessionMode,
    ) -> Self {
        Self {
            driver,
            provisioner,
            mode,
            handles: RwLock::new(HashMap::new()),
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Release policy in effect.
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        self.mode
    }

    fn lease_lock(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.leases
                .lock()
                .entry(account_id.to_string())
                .or_default(),
        )
    }

    /// Lease the account's session, creating or recreating it as needed.
    ///
    /// Waits while another task holds the account's lease.
    ///
    /// # Errors
    ///
    /// Fails only if a new session has to be created and creation fails.
    pub async fn get_context(&self, account_id: &str) -> Result<SessionLease, FleetError> {
        let lock = self.lock_account(account_id).await;
        self.checkout(lock).await
    }

    /// Take the account's exclusive lock without touching its session.
    ///
    /// Lets a caller re-check account state under the lock before deciding
    /// whether a browser should exist at all.
    pub async fn lock_account(&self, account_id: &str) -> AccountLock {
        AccountLock {
            account_id: account_id.to_string(),
            guard: self.lease_lock(account_id).lock_owned().await,
        }
    }

    /// Turn a held lock into a lease on a healthy session.
    ///
    /// # Errors
    ///
    /// Fails only if a new session has to be created and creation fails.
    pub async fn checkout(&self, lock: AccountLock) -> Result<SessionLease, FleetError> {
        let AccountLock { account_id, guard } = lock;

        let resident = self.handles.read().get(&account_id).cloned();
        if let Some(handle) = resident {
            if handle.is_healthy().await {
                debug!(account = %account_id, session = %handle.id, "reusing resident session");
                return Ok(SessionLease {
                    handle,
                    _guard: guard,
                });
            }
            warn!(account = %account_id, session = %handle.id, "resident session failed health check, recreating");
            self.discard(&account_id, &handle).await;
        }

        let handle = self.create_unlocked(&account_id).await?;
        Ok(SessionLease {
            handle,
            _guard: guard,
        })
    }

    /// Create a fresh session for the account, replacing any resident one.
    ///
    /// # Errors
    ///
    /// Fails if profile preparation or the driver launch fails.
    pub async fn create_context(&self, account_id: &str) -> Result<SessionHandle, FleetError> {
        let _guard = self.lease_lock(account_id).lock_owned().await;
        self.create_unlocked(account_id).await
    }

    async fn create_unlocked(&self, account_id: &str) -> Result<SessionHandle, FleetError> {
        let spec = self
            .provisioner
            .prepare(account_id, LaunchMode::Automated)
            .await?;
        let profile_dir = spec.profile_dir.clone();
        let session = self.driver.launch(spec).await?;
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            profile_dir,
            created_at_ms: now_ms(),
            session,
        };

        let stale = self
            .handles
            .write()
            .insert(account_id.to_string(), handle.clone());
        if let Some(stale) = stale {
            close_quietly(&stale).await;
        }
        info!(account = %account_id, session = %handle.id, "created browser session");
        Ok(handle)
    }

    /// Give the account's session back after a task.
    ///
    /// Persistent mode: no-op, the handle stays resident. Manual mode: the
    /// handle is closed and forgotten. Calling it again is harmless in both modes.
    pub async fn release_context(&self, account_id: &str) {
        match self.mode {
            SessionMode::Persistent => {
                debug!(account = %account_id, "release is a no-op in persistent mode");
            }
            SessionMode::Manual => {
                let removed = self.handles.write().remove(account_id);
                if let Some(handle) = removed {
                    close_quietly(&handle).await;
                    debug!(account = %account_id, "closed session on release");
                }
            }
        }
    }

    /// Close and forget the account's session once nobody holds its lease.
    ///
    /// Returns whether a resident session existed.
    pub async fn evict(&self, account_id: &str) -> bool {
        let _guard = self.lease_lock(account_id).lock_owned().await;
        let removed = self.handles.write().remove(account_id);
        match removed {
            Some(handle) => {
                close_quietly(&handle).await;
                info!(account = %account_id, "evicted resident session");
                true
            }
            None => false,
        }
    }

    /// Tear down every resident session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<SessionHandle> = self.handles.write().drain().map(|(_, h)| h).collect();
        let count = drained.len();
        for handle in &drained {
            if handle.session.is_connected() {
                if let Err(e) = handle.session.save_state().await {
                    warn!(account = %handle.account_id, error = %e, "failed to persist session state");
                }
            }
            close_quietly(handle).await;
        }
        info!(count, "closed all pooled sessions");
        count
    }

    /// Whether a session is resident for the account.
    #[must_use]
    pub fn contains(&self, account_id: &str) -> bool {
        self.handles.read().contains_key(account_id)
    }

    /// Number of resident sessions.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.handles.read().len()
    }

    /// Drop `handle` from the map if it is still the resident one, then close it.
    async fn discard(&self, account_id: &str, handle: &SessionHandle) {
        {
            let mut handles = self.handles.write();
            if handles.get(account_id).is_some_and(|h| h.id == handle.id) {
                handles.remove(account_id);
            }
        }
        close_quietly(handle).await;
    }
}

async fn close_quietly(handle: &SessionHandle) {
    if let Err(e) = handle.session.close().await {
        debug!(account = %handle.account_id, error = %e, "error while closing session");
    }
}
