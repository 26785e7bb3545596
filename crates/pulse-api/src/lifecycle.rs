//! ---
//! pulse_section: "05-networking-external-interfaces"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Listener start/stop state machine with graceful drain."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
//! Listener lifecycle.
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. Starting happens
//! entirely under the state lock, so concurrent callers only ever observe
//! `Stopped`, `Running` or `Stopping`.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ListenerState::Stopped => "stopped",
            ListenerState::Starting => "starting",
            ListenerState::Running => "running",
            ListenerState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// What a call to [`ApiListener::stop`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker stopped accepting and every in-flight request finished.
    Drained,
    /// Nothing was running.
    AlreadyStopped,
    /// Another caller is already draining the worker.
    AlreadyStopping,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("listener is already {state}")]
    AlreadyActive { state: ListenerState },
    #[error("serving worker failed")]
    Worker(#[source] io::Error),
    #[error("serving worker terminated abnormally")]
    Join(#[from] JoinError),
    #[error("listener must be started from within a tokio runtime")]
    NoRuntime,
    #[error("unable to install termination signal handlers")]
    Signals(#[source] io::Error),
}

#[derive(Debug)]
struct ServingWorker {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

#[derive(Debug)]
struct ListenerInner {
    state: ListenerState,
    worker: Option<ServingWorker>,
}

/// Owns the bound socket and the single worker serving it.
pub struct ApiListener {
    router: Router,
    inner: Mutex<ListenerInner>,
}

impl ApiListener {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            inner: Mutex::new(ListenerInner {
                state: ListenerState::Stopped,
                worker: None,
            }),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.inner.lock().state
    }

    /// Address actually bound while running.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.inner.lock().worker.as_ref().map(|worker| worker.addr)
    }

    /// Bind `addr` and spawn the serving worker, returning the bound address.
    ///
    /// Does not wait for any request. Port `0` binds an ephemeral port.
    pub fn start(&self, addr: SocketAddr) -> Result<SocketAddr, LifecycleError> {
        let mut inner = self.inner.lock();
        if inner.state != ListenerState::Stopped {
            return Err(LifecycleError::AlreadyActive { state: inner.state });
        }
        let runtime = Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        inner.state = ListenerState::Starting;
        let (listener, bound) = match bind(addr) {
            Ok(bound) => bound,
            Err(source) => {
                inner.state = ListenerState::Stopped;
                error!(address = %addr, error = %source, "failed to bind listener");
                return Err(LifecycleError::Bind { addr, source });
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router.clone();
        let task = runtime.spawn(
            async move {
                info!("listener accepting connections");
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                        debug!("shutdown requested; no longer accepting");
                    })
                    .await;
                if let Err(err) = &result {
                    error!(error = %err, "listener exited with error");
                }
                result
            }
            .instrument(info_span!("listener", address = %bound)),
        );

        inner.worker = Some(ServingWorker {
            addr: bound,
            shutdown: shutdown_tx,
            task,
        });
        inner.state = ListenerState::Running;
        info!(address = %bound, "listener running");
        Ok(bound)
    }

    /// Stop accepting, wait for in-flight requests, release the socket.
    ///
    /// Idempotent: calling it while stopped or stopping returns at once.
    pub async fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        let worker = {
            let mut inner = self.inner.lock();
            match inner.state {
                ListenerState::Stopped => {
                    debug!("stop requested while already stopped");
                    return Ok(StopOutcome::AlreadyStopped);
                }
                ListenerState::Stopping => {
                    debug!("stop requested while already stopping");
                    return Ok(StopOutcome::AlreadyStopping);
                }
                ListenerState::Starting | ListenerState::Running => {}
            }
            inner.state = ListenerState::Stopping;
            inner.worker.take()
        };

        let Some(worker) = worker else {
            self.inner.lock().state = ListenerState::Stopped;
            return Ok(StopOutcome::AlreadyStopped);
        };

        info!(address = %worker.addr, "stopping listener; draining in-flight requests");
        let _ = worker.shutdown.send(());
        let joined = worker.task.await;
        self.inner.lock().state = ListenerState::Stopped;

        match joined {
            Ok(Ok(())) => {
                info!(address = %worker.addr, "listener stopped");
                Ok(StopOutcome::Drained)
            }
            Ok(Err(err)) => Err(LifecycleError::Worker(err)),
            Err(err) => Err(LifecycleError::Join(err)),
        }
    }
}

impl fmt::Debug for ApiListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ApiListener")
            .field("state", &inner.state)
            .field("addr", &inner.worker.as_ref().map(|worker| worker.addr))
            .finish_non_exhaustive()
    }
}

fn bind(addr: SocketAddr) -> io::Result<(TcpListener, SocketAddr)> {
    let listener = StdTcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(listener)?;
    let bound = listener.local_addr()?;
    Ok((listener, bound))
}
