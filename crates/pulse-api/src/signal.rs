//! ---
//! pulse_section: "05-networking-external-interfaces"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Bridge from termination signals to listener shutdown."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::fmt;
use std::io;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::lifecycle::{ApiListener, LifecycleError};

/// Signals that end the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Install SIGINT/SIGTERM handlers and expose deliveries as a stream. Must
/// be called from within a tokio runtime.
///
/// Once installed the default disposition no longer applies, so install the
/// handlers before starting anything that must be drained.
#[cfg(unix)]
pub fn termination_signals() -> io::Result<BoxStream<'static, TerminationSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt())?;
    let terminate = signal(SignalKind::terminate())?;
    let deliveries = stream::unfold(
        (interrupt, terminate),
        |(mut interrupt, mut terminate)| async move {
            let received = tokio::select! {
                got = interrupt.recv() => got.map(|()| TerminationSignal::Interrupt),
                got = terminate.recv() => got.map(|()| TerminationSignal::Terminate),
            };
            received.map(|signal| (signal, (interrupt, terminate)))
        },
    );
    Ok(deliveries.boxed())
}

/// Ctrl+C deliveries as a stream.
#[cfg(not(unix))]
pub fn termination_signals() -> io::Result<BoxStream<'static, TerminationSignal>> {
    let deliveries = stream::unfold((), |()| async {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|()| (TerminationSignal::Interrupt, ()))
    });
    Ok(deliveries.boxed())
}

/// Parks the foreground until a termination signal arrives, then stops the
/// listener it was built with.
#[derive(Debug)]
pub struct SignalBridge {
    listener: Arc<ApiListener>,
}

impl SignalBridge {
    pub fn new(listener: Arc<ApiListener>) -> Self {
        Self { listener }
    }

    /// Install the process signal handlers and park on them.
    pub async fn park(self) -> Result<Option<TerminationSignal>, LifecycleError> {
        let signals = termination_signals().map_err(LifecycleError::Signals)?;
        self.park_on(signals).await
    }

    /// Park until `signals` yields, then drain the listener.
    ///
    /// Deliveries that arrive while the listener is draining are logged and
    /// otherwise ignored. Returns the signal that triggered the shutdown, or
    /// `None` when the signal source ended first.
    pub async fn park_on<S>(self, mut signals: S) -> Result<Option<TerminationSignal>, LifecycleError>
    where
        S: Stream<Item = TerminationSignal> + Unpin,
    {
        let Some(first) = signals.next().await else {
            warn!("termination signal source closed; stopping listener");
            self.listener.stop().await?;
            return Ok(None);
        };
        info!(signal = %first, "termination signal received; stopping listener");

        let stop = self.listener.stop();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                outcome = &mut stop => {
                    let outcome = outcome?;
                    info!(signal = %first, outcome = ?outcome, "shutdown complete");
                    return Ok(Some(first));
                }
                Some(repeat) = signals.next() => {
                    let outcome = self.listener.stop().await?;
                    debug!(signal = %repeat, outcome = ?outcome, "termination signal repeated during shutdown");
                }
            }
        }
    }
}
