//! Per-account launch preparation shared by the session pool and the
//! interactive window launcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::core::browser::{LaunchMode, LaunchSpec, ResourceKind};
use crate::core::collaborators::{AccountStore, Identity, IdentityProvider};
use crate::core::FleetError;

/// Builds [`LaunchSpec`]s: profile directory, stable identity, init script.
pub struct ProfileProvisioner {
    root: PathBuf,
    store: Arc<dyn AccountStore>,
    identities: Arc<dyn IdentityProvider>,
    blocked_resources: Vec<ResourceKind>,
}

impl ProfileProvisioner {
    /// Create a provisioner rooted at `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn AccountStore>,
        identities: Arc<dyn IdentityProvider>,
        blocked_resources: Vec<ResourceKind>,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            identities,
            blocked_resources,
        }
    }

    /// Root under which every account profile lives.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Profile directory for an account.
    #[must_use]
    pub fn profile_dir(&self, account_id: &str) -> PathBuf {
        self.root.join(sanitize(account_id))
    }

    /// Stored identity for the account, generating and persisting one if absent.
    ///
    /// # Errors
    ///
    /// Propagates account store failures.
    pub async fn identity_for(&self, account_id: &str) -> Result<Identity, FleetError> {
        if let Some(identity) = self.store.get_fingerprint(account_id).await? {
            return Ok(identity);
        }
        let identity = self.identities.generate_identity();
        self.store.save_fingerprint(account_id, &identity).await?;
        info!(account = %account_id, user_agent = %identity.user_agent, "generated browser identity");
        Ok(identity)
    }

    /// Prepare everything needed to launch a session for `account_id`.
    ///
    /// # Errors
    ///
    /// Fails if the profile directory cannot be created or the store fails.
    pub async fn prepare(&self, account_id: &str, mode: LaunchMode) -> Result<LaunchSpec, FleetError> {
        let profile_dir = self.profile_dir(account_id);
        tokio::fs::create_dir_all(&profile_dir).await?;
        let identity = self.identity_for(account_id).await?;
        let init_script = self.identities.create_init_script(&identity);
        Ok(LaunchSpec {
            account_id: account_id.to_string(),
            profile_dir,
            identity,
            init_script,
            blocked_resources: self.blocked_resources.clone(),
            mode,
        })
    }
}

/// Map an account id onto a single safe path component.
fn sanitize(account_id: &str) -> String {
    let cleaned: String = account_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".into()
    } else {
        cleaned
    }
}
