//! Browser driver seam.
//!
//! A [`BrowserSession`] stands for the process/context/page triple of one
//! account. Drivers are supplied by the embedding application.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::collaborators::Identity;
use crate::core::FleetError;

/// Heavy asset types a session can refuse to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Images.
    Image,
    /// Audio and video.
    Media,
    /// Web fonts.
    Font,
    /// CSS.
    Stylesheet,
}

/// How a session is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Headless, long-lived, driven by category actions.
    Automated,
    /// Human-visible window for manual login or challenge resolution.
    Interactive {
        /// Why a human is needed.
        reason: String,
        /// Driver closes the window itself once the condition is resolved.
        auto_close: bool,
    },
}

/// Everything a driver needs to start a session.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Account the session belongs to.
    pub account_id: String,
    /// Persistent profile directory (cookies, storage).
    pub profile_dir: PathBuf,
    /// Synthetic identity to present.
    pub identity: Identity,
    /// Script to install before any page script runs.
    pub init_script: String,
    /// Request types to abort.
    pub blocked_resources: Vec<ResourceKind>,
    /// Headless automation or interactive window.
    pub mode: LaunchMode,
}

/// A live browser bound to one account.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Browser process still connected.
    fn is_connected(&self) -> bool;
    /// Browser context (session) still open.
    fn is_context_open(&self) -> bool;
    /// Working page has been closed.
    fn is_page_closed(&self) -> bool;
    /// Liveness probe: number of open pages.
    async fn list_pages(&self) -> Result<usize, FleetError>;
    /// Flush cookies and storage to the profile directory.
    async fn save_state(&self) -> Result<(), FleetError>;
    /// Tear the session down.
    async fn close(&self) -> Result<(), FleetError>;
    /// Completes once the session has closed or disconnected, for any reason.
    async fn closed(&self);
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch a session as described by `spec`.
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn BrowserSession>, FleetError>;
}
