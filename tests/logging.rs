//! Log output of finished sessions.
//!
//! Every test here holds the global [`LoggerHandle`] for its whole body, so
//! records from one test never leak into another's assertions.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use log::Level;
use replayframe::{DestinationConfig, MemoryMockStore, SessionConfig, SessionError, run_session};
use replayframe_testing::{FailingStore, LoggerHandle, logger, pg::query};
use rstest::rstest;
use tokio::io::duplex;
use tokio_util::sync::CancellationToken;

const UNUSED_DESTINATION: &str = "127.0.0.1:9";

fn config() -> SessionConfig { SessionConfig::default().quiescence_window(Duration::from_millis(10)) }

#[rstest]
#[tokio::test]
async fn client_close_is_not_logged_as_a_fault(mut logger: LoggerHandle) {
    let (app, proxy) = duplex(64);
    drop(app);

    let outcome = run_session(
        CancellationToken::new(),
        Bytes::new(),
        proxy,
        DestinationConfig::new(UNUSED_DESTINATION),
        Arc::new(MemoryMockStore::new()),
        config(),
    )
    .await;
    assert!(matches!(outcome, Err(SessionError::PeerClosed)));

    let records = logger.drain();
    assert!(
        records
            .iter()
            .all(|r| r.level() != Level::Warn && r.level() != Level::Error)
    );
    assert!(
        records
            .iter()
            .any(|r| r.level() == Level::Debug && r.args().contains("session ended"))
    );
}

#[rstest]
#[tokio::test]
async fn store_failure_is_logged_with_its_error_type(mut logger: LoggerHandle) {
    let (_app, proxy) = duplex(64);

    let outcome = run_session(
        CancellationToken::new(),
        query("SELECT 1"),
        proxy,
        DestinationConfig::new(UNUSED_DESTINATION),
        Arc::new(FailingStore::new("disk unavailable")),
        config(),
    )
    .await;
    assert!(matches!(outcome, Err(SessionError::Store(_))));
    assert!(logger.contains(Level::Warn, "error_type=store"));
}
