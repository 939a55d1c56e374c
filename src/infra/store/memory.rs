//! In-process account store.
//!
//! Backed by `parking_lot` maps; suitable for tests, demos, and deployments
//! that load accounts from a file at start-up.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::collaborators::{Account, AccountStore, CategorySettings, Identity};
use crate::core::FleetError;

#[derive(Default)]
struct StoreState {
    accounts: BTreeMap<String, Account>,
    settings: HashMap<(String, String), CategorySettings>,
    fingerprints: HashMap<String, Identity>,
}

/// Seed document accepted by [`InMemoryAccountStore::from_json_str`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSeed {
    /// Accounts to load.
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// `account id -> category -> settings`.
    #[serde(default)]
    pub settings: BTreeMap<String, BTreeMap<String, CategorySettings>>,
}

/// [`AccountStore`] held entirely in memory.
#[derive(Default)]
pub struct InMemoryAccountStore {
    state: RwLock<StoreState>,
}

impl InMemoryAccountStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load accounts and settings from a JSON seed document.
    ///
    /// # Errors
    ///
    /// Returns the parse error message for malformed input.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let seed: StoreSeed = serde_json::from_str(input).map_err(|e| e.to_string())?;
        let store = Self::new();
        for account in seed.accounts {
            store.insert_account(account);
        }
        for (account_id, categories) in seed.settings {
            for (category, settings) in categories {
                store.set_category_settings(&account_id, &category, settings);
            }
        }
        Ok(store)
    }

    /// Add or replace an account.
    pub fn insert_account(&self, account: Account) {
        self.state.write().accounts.insert(account.id.clone(), account);
    }

    /// Remove an account with its settings and fingerprint.
    pub fn remove_account(&self, account_id: &str) -> Option<Account> {
        let mut state = self.state.write();
        state.settings.retain(|(id, _), _| id != account_id);
        state.fingerprints.remove(account_id);
        state.accounts.remove(account_id)
    }

    /// Set the settings for one category of one account.
    pub fn set_category_settings(&self, account_id: &str, category: &str, settings: CategorySettings) {
        self.state
            .write()
            .settings
            .insert((account_id.to_string(), category.to_string()), settings);
    }

    /// Current account record.
    #[must_use]
    pub fn account(&self, account_id: &str) -> Option<Account> {
        self.state.read().accounts.get(account_id).cloned()
    }

    /// Whether the account is paused. Unknown accounts are not.
    #[must_use]
    pub fn is_paused(&self, account_id: &str) -> bool {
        self.state
            .read()
            .accounts
            .get(account_id)
            .is_some_and(|a| a.paused)
    }

    /// Stored identity, synchronously.
    #[must_use]
    pub fn fingerprint(&self, account_id: &str) -> Option<Identity> {
        self.state.read().fingerprints.get(account_id).cloned()
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().accounts.len()
    }

    /// Whether no accounts are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn list_enabled_accounts(&self) -> Result<Vec<Account>, FleetError> {
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .filter(|a| a.enabled)
            .cloned()
            .collect())
    }

    async fn get_category_settings(
        &self,
        account_id: &str,
        category: &str,
    ) -> Result<Option<CategorySettings>, FleetError> {
        Ok(self
            .state
            .read()
            .settings
            .get(&(account_id.to_string(), category.to_string()))
            .cloned())
    }

    async fn set_pause(&self, account_id: &str, paused: bool) -> Result<(), FleetError> {
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| FleetError::Store(format!("unknown account {account_id}")))?;
        account.paused = paused;
        Ok(())
    }

    async fn get_fingerprint(&self, account_id: &str) -> Result<Option<Identity>, FleetError> {
        Ok(self.fingerprint(account_id))
    }

    async fn save_fingerprint(&self, account_id: &str, identity: &Identity) -> Result<(), FleetError> {
        self.state
            .write()
            .fingerprints
            .insert(account_id.to_string(), identity.clone());
        Ok(())
    }
}
