//! Status models for embedding the scheduler behind an API.

use serde::{Deserialize, Serialize};

use crate::core::executor::Spawn;
use crate::core::scheduler::{Scheduler, SchedulerSnapshot};

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag: not shutting down.
    pub ok: bool,
    /// Tasks executing.
    pub running: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Open interactive windows.
    pub windows: usize,
    /// Accounts waiting for a window.
    pub waiting_for_window: usize,
}

/// Full status payload.
pub fn status<S: Spawn>(scheduler: &Scheduler<S>) -> SchedulerSnapshot {
    scheduler.snapshot()
}

/// Return a health payload.
pub fn health<S: Spawn>(scheduler: &Scheduler<S>) -> Health {
    let snapshot = scheduler.snapshot();
    Health {
        ok: !snapshot.shutting_down,
        running: snapshot.executor.running,
        queued: snapshot.executor.queued,
        windows: snapshot.admission.active.len(),
        waiting_for_window: snapshot.admission.queued.len(),
    }
}

/// Serialize the status payload as JSON.
///
/// # Errors
///
/// Returns the serializer's error message.
pub fn status_json<S: Spawn>(scheduler: &Scheduler<S>) -> Result<String, String> {
    serde_json::to_string(&status(scheduler)).map_err(|e| e.to_string())
}
