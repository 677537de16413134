//! The per-connection loop: frame, match, then replay or forward.

use std::{any::Any, fmt, sync::Arc};

use bytes::Bytes;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::encode_packet,
    config::SessionConfig,
    error::SessionError,
    framer::{Framer, RequestBurst},
    matcher::{MatchOutcome, match_burst},
    metrics::{self, BurstOutcome},
    mock::{MockStore, ResponsePacket},
    passthrough::{DestinationConfig, Passthrough},
};

/// Step of the loop a worker is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Phase {
    Framing,
    Matching,
    Replaying,
    Forwarding,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Framing => "framing",
            Self::Matching => "matching",
            Self::Replaying => "replaying",
            Self::Forwarding => "forwarding",
        })
    }
}

pub(super) struct Worker<M, S> {
    id: u64,
    store: Arc<M>,
    client: S,
    framer: Framer,
    passthrough: Passthrough,
    shutdown: CancellationToken,
    seed: Option<Bytes>,
    phase: Phase,
}

impl<M, S> Worker<M, S>
where
    M: MockStore,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) fn new(
        id: u64,
        store: Arc<M>,
        client: S,
        destination: DestinationConfig,
        config: &SessionConfig,
        shutdown: CancellationToken,
        seed: Bytes,
    ) -> Self {
        Self {
            id,
            store,
            client,
            framer: Framer::new(config),
            passthrough: Passthrough::new(destination, config),
            shutdown,
            seed: Some(seed),
            phase: Phase::Framing,
        }
    }

    pub(super) fn phase(&self) -> Phase { self.phase }

    /// Run turns until one ends the session and return why it ended.
    pub(super) async fn run(&mut self) -> SessionError {
        loop {
            if let Err(err) = self.turn().await {
                return err;
            }
        }
    }

    async fn turn(&mut self) -> Result<(), SessionError> {
        self.enter(Phase::Framing);
        let seed = self.seed.take();
        let burst = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => return Err(SessionError::Cancelled),
            burst = self.framer.next_burst(&mut self.client, seed) => burst?,
        };
        if burst.is_empty() {
            metrics::inc_bursts(BurstOutcome::Empty);
            return Ok(());
        }
        self.check_cancelled()?;

        self.enter(Phase::Matching);
        let outcome = match_burst(self.store.as_ref(), &burst).await?;
        self.check_cancelled()?;

        match outcome {
            MatchOutcome::Matched(responses) => {
                self.enter(Phase::Replaying);
                self.replay(&responses).await?;
                metrics::inc_bursts(BurstOutcome::Replayed);
            }
            MatchOutcome::Unmatched => {
                self.enter(Phase::Forwarding);
                self.forward(&burst).await?;
                metrics::inc_bursts(BurstOutcome::Forwarded);
            }
        }
        Ok(())
    }

    /// Write every response in recorded order.
    ///
    /// All packets are encoded before the first write, so a packet that cannot
    /// be encoded leaves the client with no partial reply.
    async fn replay(&mut self, responses: &[ResponsePacket]) -> Result<(), SessionError> {
        let wire = responses
            .iter()
            .map(encode_packet)
            .collect::<Result<Vec<_>, _>>()?;
        for bytes in &wire {
            self.client.write_all(bytes).await?;
        }
        self.client.flush().await?;
        trace!(
            "replayed responses: id={}, packets={}, bytes={}",
            self.id,
            wire.len(),
            wire.iter().map(Bytes::len).sum::<usize>()
        );
        Ok(())
    }

    async fn forward(&mut self, burst: &RequestBurst) -> Result<(), SessionError> {
        self.passthrough.forward(&mut self.client, burst).await
    }

    fn enter(&mut self, phase: Phase) {
        trace!("session phase: id={}, phase={phase}", self.id);
        self.phase = phase;
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.shutdown.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Render a panic payload for logs.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else {
        format!("{payload:?}")
    }
}
