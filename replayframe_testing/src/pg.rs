//! PostgreSQL messages used by the test scenarios.

use bytes::Bytes;
use replayframe::{
    codec::{BackendMessage, FrontendMessage, StructuredResponse, TransactionStatus, encode_backend, encode_frontend},
    mock::{RecordedExchange, RecordedRequest, ResponsePacket},
};

/// Wire bytes of a simple query.
///
/// # Panics
///
/// Panics if `sql` contains a NUL byte.
#[must_use]
pub fn query(sql: &str) -> Bytes {
    encode_frontend(&[FrontendMessage::Query { query: sql.into() }]).expect("query has no NUL byte")
}

/// Messages a server sends after completing a command outside a transaction.
#[must_use]
pub fn command_complete(tag: &str) -> Vec<BackendMessage> {
    vec![
        BackendMessage::CommandComplete(tag.into()),
        BackendMessage::ReadyForQuery(TransactionStatus::Idle),
    ]
}

/// Wire bytes of [`command_complete`].
///
/// # Panics
///
/// Panics if `tag` contains a NUL byte.
#[must_use]
pub fn command_complete_bytes(tag: &str) -> Bytes {
    encode_backend(&command_complete(tag)).expect("tag has no NUL byte")
}

/// A structured packet answering with [`command_complete`].
///
/// # Panics
///
/// Never in practice; the packet always declares two packet types.
#[must_use]
pub fn structured_reply(tag: &str) -> ResponsePacket {
    ResponsePacket::structured(StructuredResponse::from_messages(command_complete(tag)))
        .expect("reply declares packet types")
}

/// A raw packet carrying `bytes` verbatim.
///
/// # Panics
///
/// Panics if `bytes` is empty.
#[must_use]
pub fn raw_reply(bytes: &[u8]) -> ResponsePacket { ResponsePacket::from_wire(bytes).expect("reply is not empty") }

/// A one-shot exchange answering `request` with `responses`.
#[must_use]
pub fn exchange(name: &str, request: &[u8], responses: Vec<ResponsePacket>) -> RecordedExchange {
    RecordedExchange::new(name, RecordedRequest::from_wire([request]), responses)
}
