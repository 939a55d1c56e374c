//! Contracts for the business logic plugged into the orchestration core.
//!
//! The core never knows what a category action clicks or where accounts are
//! stored; it only talks to these traits.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::session_pool::SessionHandle;
use crate::core::{ActionError, FleetError};

/// An automated game account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier.
    pub id: String,
    /// Login name, for logs.
    pub username: String,
    /// Disabled accounts are never dispatched.
    pub enabled: bool,
    /// Set while the account waits for a human in an interactive window.
    #[serde(default)]
    pub paused: bool,
}

/// Per-account settings for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    /// Whether this category runs for the account.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Category-specific options, opaque to the core.
    #[serde(default, flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for CategorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            options: BTreeMap::new(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// Browser viewport size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

/// Synthetic browser identity, stable per account once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// `navigator.userAgent`.
    pub user_agent: String,
    /// Window viewport.
    pub viewport: Viewport,
    /// `navigator.hardwareConcurrency`.
    pub hardware_concurrency: u32,
    /// `navigator.deviceMemory` in GiB.
    pub device_memory_gb: u32,
    /// `navigator.platform`.
    pub platform: String,
    /// BCP 47 locale.
    pub locale: String,
    /// IANA timezone.
    pub timezone: String,
    /// Unmasked WebGL vendor string.
    pub webgl_vendor: String,
    /// Unmasked WebGL renderer string.
    pub webgl_renderer: String,
}

/// Persistent account and settings storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All accounts with the enabled flag set.
    async fn list_enabled_accounts(&self) -> Result<Vec<Account>, FleetError>;
    /// Settings for one category, or `None` when the account has none.
    async fn get_category_settings(
        &self,
        account_id: &str,
        category: &str,
    ) -> Result<Option<CategorySettings>, FleetError>;
    /// Set or clear the pause flag.
    async fn set_pause(&self, account_id: &str, paused: bool) -> Result<(), FleetError>;
    /// Stored identity, if one was ever generated.
    async fn get_fingerprint(&self, account_id: &str) -> Result<Option<Identity>, FleetError>;
    /// Persist a freshly generated identity.
    async fn save_fingerprint(&self, account_id: &str, identity: &Identity)
        -> Result<(), FleetError>;
}

/// Identity generation and session initialisation scripts.
pub trait IdentityProvider: Send + Sync {
    /// Produce a new plausible identity.
    fn generate_identity(&self) -> Identity;
    /// Script injected into every page before site scripts run: automation
    /// signature suppression plus the outgoing-send pacing shim.
    fn create_init_script(&self, identity: &Identity) -> String;
}

/// What a category action reports back on a normal return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionReport {
    /// Whether the action achieved its goal.
    pub success: bool,
    /// How long until this category should run again for the account.
    pub wait_time: Option<Duration>,
}

impl ActionReport {
    /// Successful run with an explicit next wait.
    #[must_use]
    pub const fn done_for(wait_time: Duration) -> Self {
        Self {
            success: true,
            wait_time: Some(wait_time),
        }
    }

    /// Successful run; the category default decides the next wait.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            success: true,
            wait_time: None,
        }
    }

    /// Unsuccessful run; the category failure backoff applies unless a wait is given.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            success: false,
            wait_time: None,
        }
    }
}

/// One category of automation (building, recruiting, ...).
#[async_trait]
pub trait CategoryAction: Send + Sync {
    /// Run the category against a live session.
    async fn execute(
        &self,
        session: &SessionHandle,
        account_id: &str,
        store: &dyn AccountStore,
    ) -> Result<ActionReport, ActionError>;
}
