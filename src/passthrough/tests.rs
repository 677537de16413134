//! Tests for forwarding bursts to a scripted destination.

use std::{io, net::TcpListener as StdTcpListener, time::Duration};

use bytes::Bytes;
use replayframe_testing::{Destination, Turn};
use rstest::{fixture, rstest};
use tokio::io::{AsyncReadExt, DuplexStream, duplex};

use super::*;

#[fixture]
fn config() -> SessionConfig {
    SessionConfig::default()
        .relay_window(Duration::from_millis(20))
        .relay_first_byte_timeout(Duration::from_millis(200))
}

fn burst(buffers: &[&'static [u8]]) -> RequestBurst {
    RequestBurst::from(buffers.iter().copied().map(Bytes::from_static).collect::<Vec<_>>())
}

/// Drain whatever the forwarder has written to the client so far.
async fn client_bytes(client: &mut DuplexStream) -> Vec<u8> {
    let mut out = vec![0; 256];
    let n = tokio::time::timeout(Duration::from_millis(100), client.read(&mut out))
        .await
        .map_or(0, |read| read.expect("client read"));
    out.truncate(n);
    out
}

#[rstest]
#[tokio::test]
async fn burst_is_forwarded_in_order_and_reply_relayed(config: SessionConfig) {
    let destination = Destination::spawn(vec![Turn::reply(6, b"pong".to_vec())])
        .await
        .expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()), &config);
    let (mut server_side, mut client) = duplex(256);

    forwarder
        .forward(&mut server_side, &burst(&[b"pi", b"ng", b"!!"]))
        .await
        .expect("forward");

    assert_eq!(destination.received(), b"ping!!");
    assert_eq!(client_bytes(&mut client).await, b"pong");
    assert!(forwarder.is_connected());
}

#[rstest]
#[tokio::test]
async fn connection_is_reused_across_bursts(config: SessionConfig) {
    let destination = Destination::spawn(vec![
        Turn::reply(3, b"one".to_vec()),
        Turn::reply(3, b"two".to_vec()),
    ])
    .await
    .expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()).nodelay(true), &config);
    let (mut server_side, mut client) = duplex(256);

    forwarder.forward(&mut server_side, &burst(&[b"abc"])).await.expect("first");
    assert_eq!(client_bytes(&mut client).await, b"one");
    forwarder.forward(&mut server_side, &burst(&[b"def"])).await.expect("second");
    assert_eq!(client_bytes(&mut client).await, b"two");

    assert_eq!(destination.accepted(), 1);
    assert_eq!(destination.received(), b"abcdef");
}

#[rstest]
#[tokio::test]
async fn destination_close_drops_connection_and_redials(config: SessionConfig) {
    let destination = Destination::spawn(vec![
        Turn::reply(3, b"bye".to_vec()).then_close(),
        Turn::reply(3, b"hi".to_vec()),
    ])
    .await
    .expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()), &config);
    let (mut server_side, mut client) = duplex(256);

    forwarder.forward(&mut server_side, &burst(&[b"abc"])).await.expect("first");
    assert_eq!(client_bytes(&mut client).await, b"bye");
    assert!(!forwarder.is_connected());

    forwarder.forward(&mut server_side, &burst(&[b"def"])).await.expect("second");
    assert_eq!(client_bytes(&mut client).await, b"hi");
    assert_eq!(destination.accepted(), 2);
}

#[rstest]
#[tokio::test]
async fn silent_destination_times_out_and_is_dropped(config: SessionConfig) {
    let destination = Destination::spawn(vec![Turn::silent(4)]).await.expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()), &config);
    let (mut server_side, mut client) = duplex(256);

    let err = forwarder
        .forward(&mut server_side, &burst(&[b"ping"]))
        .await
        .expect_err("no reply");

    assert!(matches!(err, SessionError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    assert!(client_bytes(&mut client).await.is_empty());
    assert!(!forwarder.is_connected());
}

#[rstest]
#[tokio::test]
async fn reply_later_than_first_byte_timeout_fails_the_forward(config: SessionConfig) {
    let destination = Destination::spawn(vec![
        Turn::reply(4, b"late".to_vec()).after(Duration::from_millis(400)),
    ])
    .await
    .expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()), &config);
    let (mut server_side, mut client) = duplex(256);

    let err = forwarder
        .forward(&mut server_side, &burst(&[b"slow"]))
        .await
        .expect_err("reply too late");

    assert!(matches!(err, SessionError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
    assert!(!forwarder.is_connected());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(client_bytes(&mut client).await.is_empty());
}

#[tokio::test]
async fn reply_spanning_several_chunks_is_relayed_whole() {
    let config = SessionConfig::default()
        .relay_window(Duration::from_millis(150))
        .relay_first_byte_timeout(Duration::from_millis(500));
    let parts = vec![b"one-".to_vec(), b"two-".to_vec(), b"three".to_vec()];
    let destination = Destination::spawn(vec![Turn::in_parts(2, parts, Duration::from_millis(30))])
        .await
        .expect("destination");
    let mut forwarder = Passthrough::new(DestinationConfig::new(destination.address()), &config);
    let (mut server_side, mut client) = duplex(256);

    forwarder.forward(&mut server_side, &burst(&[b"go"])).await.expect("forward");

    assert_eq!(client_bytes(&mut client).await, b"one-two-three");
    assert!(forwarder.is_connected());
}

#[rstest]
#[tokio::test]
async fn refused_dial_is_an_io_error(config: SessionConfig) {
    let address = {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr").to_string()
    };
    let mut forwarder = Passthrough::new(DestinationConfig::new(address), &config);
    let (mut server_side, _client) = duplex(256);

    let err = forwarder
        .forward(&mut server_side, &burst(&[b"ping"]))
        .await
        .expect_err("nothing listens");
    assert!(matches!(err, SessionError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused));
}

#[test]
fn destination_config_deserializes_with_defaults() {
    let destination: DestinationConfig =
        serde_json::from_str(r#"{ "address": "db:5432" }"#).expect("destination config");
    assert_eq!(destination, DestinationConfig::new("db:5432"));
    assert_eq!(destination.connect_timeout, Duration::from_secs(5));
}
