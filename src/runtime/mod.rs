//! Runtime adapters: tokio spawning, OS signals, and the status surface.

pub mod api;
pub mod signals;
pub mod tokio_spawner;

pub use api::{health, status, Health};
pub use signals::{listen, TerminationSignal};
pub use tokio_spawner::TokioSpawner;
