//! Scripted stand-in for the real server behind a passthrough.

use std::{
    collections::VecDeque,
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// One request/reply step of a scripted destination.
#[derive(Clone, Debug)]
pub struct Turn {
    request_len: usize,
    parts: Vec<Vec<u8>>,
    delay: Duration,
    gap: Duration,
    close: bool,
}

impl Turn {
    /// Read `request_len` bytes, then send `reply`.
    #[must_use]
    pub fn reply(request_len: usize, reply: Vec<u8>) -> Self { Self::in_parts(request_len, vec![reply], Duration::ZERO) }

    /// Read `request_len` bytes, then send each of `parts` with `gap` between
    /// them.
    #[must_use]
    pub fn in_parts(request_len: usize, parts: Vec<Vec<u8>>, gap: Duration) -> Self {
        Self {
            request_len,
            parts: parts.into_iter().filter(|part| !part.is_empty()).collect(),
            delay: Duration::ZERO,
            gap,
            close: false,
        }
    }

    /// Read `request_len` bytes and send nothing back.
    #[must_use]
    pub fn silent(request_len: usize) -> Self { Self::in_parts(request_len, Vec::new(), Duration::ZERO) }

    /// Wait `delay` after the request before sending the first part.
    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Close the connection after this turn.
    #[must_use]
    pub fn then_close(mut self) -> Self {
        self.close = true;
        self
    }
}

#[derive(Default)]
struct Shared {
    turns: Mutex<VecDeque<Turn>>,
    received: Mutex<Vec<u8>>,
    accepted: AtomicUsize,
}

/// A TCP server on localhost that follows a script of [`Turn`]s.
///
/// Connections are served one at a time. The script is shared by every
/// connection, so a turn ending in a close hands the remaining turns to the
/// next connection. When the script runs out the connection is held open
/// until the peer closes it.
pub struct Destination {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl Destination {
    /// Bind an ephemeral port and start serving `turns`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while binding the listener.
    pub async fn spawn(turns: Vec<Turn>) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            turns: Mutex::new(turns.into()),
            ..Shared::default()
        });
        let task = tokio::spawn(serve(listener, Arc::clone(&shared)));
        Ok(Self { addr, shared, task })
    }

    /// Address to dial, as `host:port`.
    #[must_use]
    pub fn address(&self) -> String { self.addr.to_string() }

    /// Every byte received so far, across all connections.
    #[must_use]
    pub fn received(&self) -> Vec<u8> { self.shared.received.lock().expect("received poisoned").clone() }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn accepted(&self) -> usize { self.shared.accepted.load(Ordering::SeqCst) }
}

impl Drop for Destination {
    fn drop(&mut self) { self.task.abort(); }
}

async fn serve(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((stream, _)) = listener.accept().await {
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        // A peer hanging up mid-turn only ends its own connection.
        let _ = handle(stream, &shared).await;
    }
}

async fn handle(mut stream: TcpStream, shared: &Shared) -> io::Result<()> {
    loop {
        let next = shared.turns.lock().expect("turns poisoned").pop_front();
        let Some(turn) = next else {
            // Hold the connection until the peer goes away.
            let mut sink = Vec::new();
            stream.read_to_end(&mut sink).await?;
            shared.received.lock().expect("received poisoned").extend_from_slice(&sink);
            return Ok(());
        };
        let mut request = vec![0; turn.request_len];
        stream.read_exact(&mut request).await?;
        shared.received.lock().expect("received poisoned").extend_from_slice(&request);
        tokio::time::sleep(turn.delay).await;
        for (i, part) in turn.parts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(turn.gap).await;
            }
            stream.write_all(part).await?;
            stream.flush().await?;
        }
        if turn.close {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}
