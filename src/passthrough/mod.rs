//! Forwarding of unmatched bursts to the real destination.
//!
//! A [`Passthrough`] owns at most one upstream connection per session. It is
//! dialled on the first unmatched burst and reused until the destination
//! closes it, at which point the next unmatched burst dials again. A
//! destination that does not start replying within the first-byte timeout
//! fails the forward, since a reply arriving later could only be mistaken
//! for the answer to a later request.

use std::{io, time::Duration};

use bytes::BytesMut;
use log::{debug, trace};
use serde::Deserialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{
    config::SessionConfig,
    error::SessionError,
    framer::{ReadOutcome, RequestBurst, read_chunk},
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_connect_timeout() -> Duration { DEFAULT_CONNECT_TIMEOUT }

/// How to reach the real server.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use replayframe::DestinationConfig;
///
/// let destination = DestinationConfig::new("127.0.0.1:5432")
///     .connect_timeout(Duration::from_secs(1))
///     .nodelay(true);
/// assert_eq!(destination.address, "127.0.0.1:5432");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DestinationConfig {
    /// `host:port` of the destination.
    pub address: String,
    /// Upper bound on establishing the TCP connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Whether to set `TCP_NODELAY` on the upstream socket.
    #[serde(default)]
    pub nodelay: bool,
}

impl DestinationConfig {
    /// Describe a destination at `address` with default dialling parameters.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: false,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configure `TCP_NODELAY` on the upstream socket.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

/// How a relay ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RelayEnd {
    /// The destination went quiet after replying.
    Quiet,
    /// The destination closed the connection.
    Closed,
}

/// Sends unmatched bursts to the destination and relays its reply.
pub struct Passthrough {
    destination: DestinationConfig,
    relay_window: Duration,
    first_byte_timeout: Duration,
    read_buffer_size: usize,
    upstream: Option<TcpStream>,
    buf: BytesMut,
}

impl Passthrough {
    /// Create a forwarder that dials lazily.
    #[must_use]
    pub fn new(destination: DestinationConfig, config: &SessionConfig) -> Self {
        let config = config.normalized();
        Self {
            destination,
            relay_window: config.relay_window,
            first_byte_timeout: config.relay_first_byte_timeout,
            read_buffer_size: config.read_buffer_size,
            upstream: None,
            buf: BytesMut::new(),
        }
    }

    /// Whether an upstream connection is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.upstream.is_some() }

    /// Forward `burst` and copy the destination's reply to `client`.
    ///
    /// Each buffer is written on its own, in order, so the destination sees
    /// the same byte sequence the client sent. The reply is relayed chunk by
    /// chunk until the destination stays quiet for one relay window or closes
    /// the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if dialling, writing or reading fails on
    /// either connection, or with [`io::ErrorKind::TimedOut`] if the
    /// destination sends nothing before the first-byte timeout. The upstream
    /// connection is dropped on any error. Nothing is retried.
    pub async fn forward<C>(&mut self, client: &mut C, burst: &RequestBurst) -> Result<(), SessionError>
    where
        C: AsyncWrite + Unpin,
    {
        let mut upstream = match self.upstream.take() {
            Some(stream) => stream,
            None => self.dial().await?,
        };
        for buffer in burst {
            upstream.write_all(buffer).await?;
        }
        upstream.flush().await?;
        trace!(
            "forwarded burst: buffers={}, bytes={}",
            burst.len(),
            burst.total_len()
        );

        match self.relay(&mut upstream, client).await? {
            (RelayEnd::Quiet, relayed) => {
                trace!("relayed reply: bytes={relayed}");
                self.upstream = Some(upstream);
            }
            (RelayEnd::Closed, relayed) => debug!("destination closed connection: relayed_bytes={relayed}"),
        }
        Ok(())
    }

    async fn dial(&self) -> io::Result<TcpStream> {
        let address = self.destination.address.as_str();
        let stream = tokio::time::timeout(self.destination.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connecting to {address} timed out")))??;
        stream.set_nodelay(self.destination.nodelay)?;
        debug!("dialled destination: address={address}");
        Ok(stream)
    }

    async fn relay<C>(&mut self, upstream: &mut TcpStream, client: &mut C) -> io::Result<(RelayEnd, usize)>
    where
        C: AsyncWrite + Unpin,
    {
        let mut relayed = 0;
        let mut window = self.first_byte_timeout;
        let end = loop {
            match read_chunk(upstream, &mut self.buf, self.read_buffer_size, window).await? {
                ReadOutcome::Data(chunk) => {
                    client.write_all(&chunk).await?;
                    relayed += chunk.len();
                    window = self.relay_window;
                }
                ReadOutcome::Quiet if relayed == 0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "{} sent no reply within {:?}",
                            self.destination.address, self.first_byte_timeout
                        ),
                    ));
                }
                ReadOutcome::Quiet => break RelayEnd::Quiet,
                ReadOutcome::Closed => break RelayEnd::Closed,
            }
        };
        client.flush().await?;
        Ok((end, relayed))
    }
}

#[cfg(test)]
mod tests;
