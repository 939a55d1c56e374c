//! Process termination signals as a channel.

use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;

/// A termination request from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// Ctrl-C / SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Forward every SIGINT (and SIGTERM on unix) into the returned receiver.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn listen() -> mpsc::Receiver<TerminationSignal> {
    let (tx, rx) = mpsc::channel(4);

    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "unable to listen for ctrl-c");
                break;
            }
            if interrupt_tx.send(TerminationSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM");
                return;
            }
        };
        while terminate.recv().await.is_some() {
            if tx.send(TerminationSignal::Terminate).await.is_err() {
                break;
            }
        }
    });
    #[cfg(not(unix))]
    drop(tx);

    rx
}
