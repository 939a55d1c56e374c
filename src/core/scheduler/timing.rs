//! Per-(account, category) eligibility deadlines.
//!
//! Written only by the task that just ran the category for the account, read
//! by that category's loop before dispatch. A missing entry means "eligible now".

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use crate::util::clock::after_ms;

type TimingKey = (String, String);

/// Next-eligible timestamps keyed by account and category.
#[derive(Default)]
pub struct TimingState {
    deadlines: RwLock<HashMap<TimingKey, u128>>,
}

impl TimingState {
    /// Empty state: everything eligible.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the deadline for `(account_id, category)` has been reached at `now_ms`.
    #[must_use]
    pub fn is_eligible(&self, account_id: &str, category: &str, now_ms: u128) -> bool {
        self.next_eligible(account_id, category)
            .is_none_or(|deadline| deadline <= now_ms)
    }

    /// Stored deadline, if any.
    #[must_use]
    pub fn next_eligible(&self, account_id: &str, category: &str) -> Option<u128> {
        self.deadlines
            .read()
            .get(&(account_id.to_string(), category.to_string()))
            .copied()
    }

    /// Set an absolute deadline.
    pub fn set_next(&self, account_id: &str, category: &str, deadline_ms: u128) {
        self.deadlines
            .write()
            .insert((account_id.to_string(), category.to_string()), deadline_ms);
    }

    /// Push the deadline to `now_ms + delay`; returns the new deadline.
    pub fn defer(&self, account_id: &str, category: &str, now_ms: u128, delay: Duration) -> u128 {
        let deadline = after_ms(now_ms, delay);
        self.set_next(account_id, category, deadline);
        deadline
    }

    /// Forget every deadline of an account.
    pub fn clear_account(&self, account_id: &str) {
        self.deadlines.write().retain(|(account, _), _| account != account_id);
    }

    /// Number of stored deadlines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.read().len()
    }

    /// True when no deadline is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.read().is_empty()
    }
}
