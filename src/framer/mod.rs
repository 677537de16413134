//! Idle-timeout framing of client traffic.
//!
//! PostgreSQL gives an intermediary no end-of-turn marker it can rely on
//! without interpreting every message, so the framer groups reads by timing
//! instead. Each read is bounded by the quiescence window; a read that
//! produces data restarts the window, and a window that elapses with no data
//! closes the burst.

use std::{io, time::Duration};

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{config::SessionConfig, error::SessionError};

/// Buffers read from the client during one turn, in arrival order.
///
/// Each element is exactly what one read call produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestBurst {
    buffers: Vec<Bytes>,
}

impl RequestBurst {
    /// Create an empty burst.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub(crate) fn push(&mut self, buffer: Bytes) { self.buffers.push(buffer); }

    /// Number of buffers in the burst.
    #[must_use]
    pub fn len(&self) -> usize { self.buffers.len() }

    /// Whether the burst holds no buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buffers.is_empty() }

    /// The buffers in arrival order.
    #[must_use]
    pub fn buffers(&self) -> &[Bytes] { &self.buffers }

    /// Iterate over the buffers in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> { self.buffers.iter() }

    /// Total number of bytes across every buffer.
    #[must_use]
    pub fn total_len(&self) -> usize { self.buffers.iter().map(Bytes::len).sum() }

    /// Every buffer joined into one contiguous byte string.
    #[must_use]
    pub fn concatenated(&self) -> Bytes {
        match self.buffers.as_slice() {
            [] => Bytes::new(),
            [only] => only.clone(),
            many => {
                let mut out = BytesMut::with_capacity(self.total_len());
                for buffer in many {
                    out.extend_from_slice(buffer);
                }
                out.freeze()
            }
        }
    }

    /// Take ownership of the buffers.
    #[must_use]
    pub fn into_buffers(self) -> Vec<Bytes> { self.buffers }
}

impl From<Vec<Bytes>> for RequestBurst {
    fn from(buffers: Vec<Bytes>) -> Self { Self { buffers } }
}

impl<'a> IntoIterator for &'a RequestBurst {
    type Item = &'a Bytes;
    type IntoIter = std::slice::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter { self.buffers.iter() }
}

/// Result of one bounded read.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The read produced bytes.
    Data(Bytes),
    /// Nothing arrived within the window.
    Quiet,
    /// The peer closed its write side.
    Closed,
}

/// Read once from `conn`, giving up after `window`.
///
/// Transports that report their own read deadlines with `TimedOut` or
/// `WouldBlock` are treated as quiet as well.
pub(crate) async fn read_chunk<S>(
    conn: &mut S,
    buf: &mut BytesMut,
    capacity: usize,
    window: Duration,
) -> io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    buf.reserve(capacity);
    match tokio::time::timeout(window, conn.read_buf(buf)).await {
        Err(_elapsed) => Ok(ReadOutcome::Quiet),
        Ok(Ok(0)) => Ok(ReadOutcome::Closed),
        Ok(Ok(_)) => Ok(ReadOutcome::Data(buf.split().freeze())),
        Ok(Err(e)) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            Ok(ReadOutcome::Quiet)
        }
        Ok(Err(e)) => Err(e),
    }
}

/// Groups client reads into [`RequestBurst`]s.
pub struct Framer {
    window: Duration,
    read_buffer_size: usize,
    max_burst_bytes: Option<usize>,
    buf: BytesMut,
}

impl Framer {
    /// Create a framer from normalised session settings.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        let config = config.normalized();
        Self {
            window: config.quiescence_window,
            read_buffer_size: config.read_buffer_size,
            max_burst_bytes: config.max_burst_bytes,
            buf: BytesMut::new(),
        }
    }

    /// Read the next burst from `conn`.
    ///
    /// `seed` opens the burst with bytes the caller already read. The call
    /// returns once a quiescence window passes without data, or once the
    /// burst reaches the configured size cap. An empty burst is returned as
    /// `Ok` and costs one full window.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PeerClosed`] when the client closes the
    /// connection, discarding any buffers of the unfinished burst, and
    /// [`SessionError::Io`] for any other read failure. No further read is
    /// issued after an error.
    pub async fn next_burst<S>(&mut self, conn: &mut S, seed: Option<Bytes>) -> Result<RequestBurst, SessionError>
    where
        S: AsyncRead + Unpin,
    {
        let mut burst = RequestBurst::new();
        let mut total = 0;
        if let Some(seed) = seed.filter(|s| !s.is_empty()) {
            total += seed.len();
            burst.push(seed);
        }
        while !self.is_full(total) {
            match read_chunk(conn, &mut self.buf, self.read_buffer_size, self.window).await? {
                ReadOutcome::Data(chunk) => {
                    trace!("read client chunk: len={}", chunk.len());
                    total += chunk.len();
                    burst.push(chunk);
                }
                ReadOutcome::Quiet => break,
                ReadOutcome::Closed => {
                    debug!(
                        "client closed connection: discarded_buffers={}, discarded_bytes={total}",
                        burst.len()
                    );
                    return Err(SessionError::PeerClosed);
                }
            }
        }
        if !burst.is_empty() {
            debug!("burst complete: buffers={}, bytes={total}", burst.len());
        }
        Ok(burst)
    }

    fn is_full(&self, total: usize) -> bool { self.max_burst_bytes.is_some_and(|limit| total >= limit) }
}

#[cfg(test)]
mod tests;
