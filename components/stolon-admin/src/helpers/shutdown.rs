//! Process termination signals.
//!
//! Interrupt and terminate are the only cancellation primitive of `stolonrpc`.
//! The OS handlers are installed eagerly by [`termination_signals`]; a
//! background task forwards the first signal received into a single-slot
//! channel that the supervision loop waits on.

// External crates
use std::{fmt, io};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};
use tracing::{Instrument, instrument, instrument::WithSubscriber};

/// A signal asking the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("interrupt"),
            TerminationSignal::Terminate => f.write_str("terminated"),
        }
    }
}

/// Install SIGINT and SIGTERM handlers and return the channel signals arrive on.
///
/// Handlers are registered before this returns, so a signal delivered
/// afterwards is never handled by the default disposition.
#[instrument(
    name = "shutdown::termination_signals",
    target = "helpers::shutdown",
    level = "trace"
)]
pub fn termination_signals() -> io::Result<mpsc::Receiver<TerminationSignal>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(
        async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => TerminationSignal::Interrupt,
                    Some(()) = terminate.recv() => TerminationSignal::Terminate,
                    else => break,
                };
                tracing::trace!(signal = %received, "Termination signal received");
                if tx.send(received).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span()
        .with_current_subscriber(),
    );

    tracing::trace!("Termination signal handlers installed");
    Ok(rx)
}
