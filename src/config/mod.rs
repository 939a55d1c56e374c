//! Configuration models for the executor, pools, loops, and shutdown.

pub mod orchestrator;

pub use orchestrator::{
    AdmissionConfig, CategoryConfig, ExecutorConfig, OrchestratorConfig, PacingConfig,
    SessionPoolConfig, ShutdownConfig, WatchdogConfig,
};
