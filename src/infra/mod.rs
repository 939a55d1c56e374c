//! Infrastructure adapters: the pending-task queue and in-process collaborators.

pub mod queue;
pub mod stealth;
pub mod store;

pub use queue::PendingQueue;
pub use stealth::DefaultIdentityProvider;
pub use store::InMemoryAccountStore;
