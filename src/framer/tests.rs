//! Tests for burst framing under tokio's paused clock.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf, duplex},
    time::{Instant, sleep},
};

use super::*;

const WINDOW: Duration = Duration::from_millis(10);

const LINGER: Duration = Duration::from_secs(1);

#[fixture]
fn framer() -> Framer { Framer::new(&SessionConfig::default().quiescence_window(WINDOW)) }

/// Write each chunk after its delay, keep the stream open for `linger`, then
/// close it.
fn script(mut writer: DuplexStream, steps: Vec<(Duration, &'static str)>, linger: Duration) {
    tokio::spawn(async move {
        for (delay, chunk) in steps {
            sleep(delay).await;
            writer.write_all(chunk.as_bytes()).await.expect("write chunk");
        }
        sleep(linger).await;
    });
}

fn buffers(burst: &RequestBurst) -> Vec<&[u8]> { burst.iter().map(|b| &b[..]).collect() }

#[rstest]
#[tokio::test(start_paused = true)]
async fn reads_inside_the_window_form_one_burst(mut framer: Framer) {
    let (writer, mut reader) = duplex(64);
    let gap = WINDOW / 2;
    script(
        writer,
        vec![(Duration::ZERO, "one"), (gap, "two"), (gap, "three")],
        LINGER,
    );

    let burst = framer.next_burst(&mut reader, None).await.expect("burst");
    assert_eq!(buffers(&burst), vec![&b"one"[..], &b"two"[..], &b"three"[..]]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reads_beyond_the_window_form_separate_bursts(mut framer: Framer) {
    let (writer, mut reader) = duplex(64);
    let gap = WINDOW * 3;
    script(
        writer,
        vec![(Duration::ZERO, "one"), (gap, "two"), (gap, "three")],
        LINGER,
    );

    for expected in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        let mut burst = framer.next_burst(&mut reader, None).await.expect("burst");
        while burst.is_empty() {
            burst = framer.next_burst(&mut reader, None).await.expect("burst");
        }
        assert_eq!(buffers(&burst), vec![expected]);
    }
    assert!(matches!(
        framer.next_burst(&mut reader, None).await,
        Err(SessionError::PeerClosed)
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn seed_opens_the_first_burst(mut framer: Framer) {
    let (writer, mut reader) = duplex(64);
    script(writer, vec![(Duration::from_millis(1), "more")], LINGER);

    let burst = framer
        .next_burst(&mut reader, Some(Bytes::from_static(b"seed")))
        .await
        .expect("burst");
    assert_eq!(buffers(&burst), vec![&b"seed"[..], &b"more"[..]]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn quiet_connection_yields_empty_burst_after_one_window(mut framer: Framer) {
    let (_writer, mut reader) = duplex(64);
    let started = Instant::now();

    let burst = framer.next_burst(&mut reader, None).await.expect("burst");
    assert!(burst.is_empty());
    assert!(started.elapsed() >= WINDOW);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn eof_discards_partial_burst(mut framer: Framer) {
    let (writer, mut reader) = duplex(64);
    script(writer, vec![(Duration::ZERO, "partial")], Duration::ZERO);

    let err = framer.next_burst(&mut reader, None).await.expect_err("peer closed");
    assert!(err.is_peer_closed());
}

#[tokio::test(start_paused = true)]
async fn burst_closes_early_at_size_cap() {
    let config = SessionConfig::default()
        .quiescence_window(WINDOW)
        .max_burst_bytes(Some(6));
    let mut framer = Framer::new(&config);
    let (writer, mut reader) = duplex(64);
    let gap = Duration::from_millis(1);
    script(writer, vec![(gap, "aaaa"), (gap, "bbbb"), (gap, "cccc")], LINGER);

    let first = framer.next_burst(&mut reader, None).await.expect("burst");
    assert_eq!(buffers(&first), vec![&b"aaaa"[..], &b"bbbb"[..]]);
    let second = framer.next_burst(&mut reader, None).await.expect("burst");
    assert_eq!(buffers(&second), vec![&b"cccc"[..]]);
}

struct ErrorReader {
    kind: io::ErrorKind,
    polls: usize,
}

impl AsyncRead for ErrorReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.polls += 1;
        Poll::Ready(Err(io::Error::from(self.kind)))
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn read_error_is_terminal_after_one_read(mut framer: Framer) {
    let mut conn = ErrorReader {
        kind: io::ErrorKind::ConnectionReset,
        polls: 0,
    };

    let err = framer.next_burst(&mut conn, None).await.expect_err("read error");
    assert!(matches!(err, SessionError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
    assert_eq!(conn.polls, 1);
}

#[rstest]
#[case::timed_out(io::ErrorKind::TimedOut)]
#[case::would_block(io::ErrorKind::WouldBlock)]
#[tokio::test(start_paused = true)]
async fn transport_deadlines_close_the_burst(mut framer: Framer, #[case] kind: io::ErrorKind) {
    let mut conn = ErrorReader { kind, polls: 0 };

    let burst = framer
        .next_burst(&mut conn, Some(Bytes::from_static(b"seed")))
        .await
        .expect("deadline is not an error");
    assert_eq!(buffers(&burst), vec![&b"seed"[..]]);
}

#[test]
fn concatenated_joins_buffers_in_order() {
    let burst = RequestBurst::from(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
    assert_eq!(burst.total_len(), 4);
    assert_eq!(&burst.concatenated()[..], b"abcd");
    assert!(RequestBurst::new().concatenated().is_empty());
}
