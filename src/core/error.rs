//! Error types for orchestration components.

use thiserror::Error;

/// Errors produced by orchestration components.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The browser driver could not start a session.
    #[error("browser launch failed for account {account}: {reason}")]
    Launch {
        /// Account the launch was for.
        account: String,
        /// Driver-supplied reason.
        reason: String,
    },
    /// A live session reported a failure (probe, state persistence, close).
    #[error("browser session error: {0}")]
    Session(String),
    /// Account store call failed.
    #[error("account store error: {0}")]
    Store(String),
    /// Filesystem failure while preparing a profile directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The task body panicked; the executor slot was still released.
    #[error("task `{0}` panicked")]
    TaskPanicked(String),
    /// The task was removed from the pending queue before it started.
    #[error("task `{0}` discarded before start")]
    TaskDiscarded(String),
}

/// Failure signalled by a category action.
///
/// Login and challenge outcomes are expected states of the game session, not
/// bugs: the scheduler reacts to them by suspending the account.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The session is logged out and credentials must be re-entered by a human.
    #[error("login required: {0}")]
    LoginRequired(String),
    /// An anti-bot challenge is on screen.
    #[error("challenge detected: {0}")]
    ChallengeDetected(String),
    /// Any other failure inside the action.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    /// True when the account must be handed to a human before automation resumes.
    #[must_use]
    pub const fn needs_intervention(&self) -> bool {
        matches!(self, Self::LoginRequired(_) | Self::ChallengeDetected(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
