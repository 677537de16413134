//! Per-connection interception sessions.
//!
//! A session owns one background worker that loops through framing, matching
//! and then either replaying recorded responses or forwarding to the real
//! destination. The worker reports exactly one terminal outcome through a
//! oneshot channel. [`Session::run`] races that outcome against the caller's
//! [`CancellationToken`] and returns as soon as either resolves, so the caller
//! never waits on a read that is still in flight.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use replayframe::{DestinationConfig, MemoryMockStore, Session};
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:6432").await?;
//! let (client, _) = listener.accept().await?;
//! let store = Arc::new(MemoryMockStore::new());
//! let session = Session::new(store, DestinationConfig::new("127.0.0.1:5432"));
//! if let Err(err) = session.run(CancellationToken::new(), Bytes::new(), client).await {
//!     if !err.is_graceful() {
//!         return Err(err.into());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod counter;
mod worker;

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
pub use counter::active_session_count;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;

use self::{
    counter::ActiveSession,
    worker::{Worker, panic_message},
};
use crate::{config::SessionConfig, error::SessionError, mock::MockStore, passthrough::DestinationConfig};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Everything a session needs besides the client connection.
pub struct Session<M> {
    store: Arc<M>,
    destination: DestinationConfig,
    config: SessionConfig,
}

impl<M: MockStore> Session<M> {
    /// Create a session with default tuning.
    #[must_use]
    pub fn new(store: Arc<M>, destination: DestinationConfig) -> Self {
        Self {
            store,
            destination,
            config: SessionConfig::default(),
        }
    }

    /// Replace the session tuning.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve `client` until it disconnects, a fault occurs or `shutdown`
    /// fires.
    ///
    /// `request` holds bytes the caller already read from `client`; it opens
    /// the first burst and may be empty.
    ///
    /// Cancellation returns at once. The worker notices the token between
    /// phases and while framing; a write already in progress is left to
    /// finish or fail on its own.
    ///
    /// # Errors
    ///
    /// Always returns the session's terminal [`SessionError`]:
    /// [`SessionError::Cancelled`] once `shutdown` fires, otherwise whatever
    /// ended the worker. A clean client close is
    /// [`SessionError::PeerClosed`]; check
    /// [`is_graceful`](SessionError::is_graceful) before logging an outcome
    /// as a fault.
    pub async fn run<S>(self, shutdown: CancellationToken, request: Bytes, client: S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut worker = Worker::new(
            id,
            self.store,
            client,
            self.destination,
            &self.config,
            shutdown.clone(),
            request,
        );
        debug!("session started: id={id}");

        tokio::spawn(async move {
            let _active = ActiveSession::new();
            let result = AssertUnwindSafe(worker.run()).catch_unwind().await;
            let outcome = match result {
                Ok(err) => err,
                Err(panic) => {
                    let panic_msg = panic_message(&*panic);
                    let phase = worker.phase();
                    // Emit via both `log` and `tracing` for tests that capture either.
                    error!("session worker panicked: id={id}, phase={phase}, panic={panic_msg}");
                    tracing::error!(id, %phase, panic = %panic_msg, "session worker panicked");
                    SessionError::WorkerPanicked(panic_msg)
                }
            };
            report(id, worker.phase(), &outcome);
            // The caller stops listening once cancelled.
            let _ = tx.send(outcome);
        });

        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("session cancelled by caller: id={id}");
                Err(SessionError::Cancelled)
            }
            outcome = rx => Err(outcome.unwrap_or_else(|_| {
                SessionError::WorkerPanicked("worker stopped without reporting an outcome".into())
            })),
        }
    }
}

fn report(id: u64, phase: worker::Phase, outcome: &SessionError) {
    crate::metrics::inc_session_outcomes(outcome.error_type());
    match outcome {
        err if err.is_graceful() => debug!("session ended: id={id}, phase={phase}, reason={err}"),
        SessionError::WorkerPanicked(_) => {}
        err => warn!("session failed: id={id}, phase={phase}, error={err}, error_type={}", err.error_type()),
    }
}

/// Serve one client connection.
///
/// Equivalent to building a [`Session`] from `destination`, `store` and
/// `config` and calling [`Session::run`].
///
/// # Errors
///
/// See [`Session::run`].
pub async fn run_session<M, S>(
    shutdown: CancellationToken,
    request: Bytes,
    client: S,
    destination: DestinationConfig,
    store: Arc<M>,
    config: SessionConfig,
) -> Result<(), SessionError>
where
    M: MockStore,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    Session::new(store, destination)
        .with_config(config)
        .run(shutdown, request, client)
        .await
}
