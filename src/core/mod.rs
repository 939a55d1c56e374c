//! Orchestration core: executor, session pool, admission queue, scheduler.

pub mod admission;
pub mod audit;
pub mod browser;
pub mod collaborators;
pub mod error;
pub mod executor;
pub mod profile;
pub mod scheduler;
pub mod session_pool;

pub use admission::{
    ActiveWindow, AdmissionEntry, AdmissionQueue, AdmissionReason, AdmissionSnapshot,
    BrowserWindowLauncher, WindowLauncher, WindowObserver,
};
pub use audit::{
    build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, SharedAuditSink,
    SharedMemoryAuditSink,
};
pub use browser::{BrowserDriver, BrowserSession, LaunchMode, LaunchSpec, ResourceKind};
pub use collaborators::{
    Account, AccountStore, ActionReport, CategoryAction, CategorySettings, Identity,
    IdentityProvider, Viewport,
};
pub use error::{ActionError, AppResult, FleetError};
pub use executor::{ExecutorStats, Priority, Spawn, TaskExecutor, TaskHandle};
pub use profile::ProfileProvisioner;
pub use scheduler::{
    CategoryLoop, CycleReport, Scheduler, SchedulerContext, SchedulerSnapshot, ShutdownCoordinator,
    ShutdownPhase, ShutdownReport, TimingState, Watchdog,
};
pub use session_pool::{AccountLock, SessionHandle, SessionLease, SessionMode, SessionPool};
