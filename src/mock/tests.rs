//! Tests for recorded exchanges and the in-memory store.

use bytes::Bytes;
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::codec::{BackendMessage, FrontendMessage, PacketType, TransactionStatus, encode_frontend};

fn query(sql: &str) -> Bytes {
    encode_frontend(&[FrontendMessage::Query { query: sql.into() }]).expect("encode query")
}

fn reply(tag: &str) -> ResponsePacket {
    ResponsePacket::structured(StructuredResponse::from_messages([
        BackendMessage::CommandComplete(tag.into()),
        BackendMessage::ReadyForQuery(TransactionStatus::Idle),
    ]))
    .expect("declares packet types")
}

fn exchange(name: &str, request: &[Bytes], tag: &str) -> RecordedExchange {
    RecordedExchange::new(name, RecordedRequest::from_wire(request), vec![reply(tag)])
}

fn burst<B: AsRef<[u8]>>(buffers: &[B]) -> RequestBurst {
    RequestBurst::from(
        buffers
            .iter()
            .map(|b| Bytes::copy_from_slice(b.as_ref()))
            .collect::<Vec<_>>(),
    )
}

#[fixture]
fn store() -> MemoryMockStore { MemoryMockStore::new() }

#[test]
fn raw_packet_deserializes_from_payload() {
    let packet: ResponsePacket = serde_json::from_value(json!({ "payload": "UkQ=" })).expect("raw packet");
    assert_eq!(packet, ResponsePacket::raw("UkQ=").expect("non-empty"));
}

#[test]
fn structured_packet_deserializes_from_types_and_fields() {
    let packet: ResponsePacket = serde_json::from_value(json!({
        "packet_types": ["command_complete", "ready_for_query"],
        "fields": {
            "command_complete": ["SELECT 1"],
            "ready_for_query": ["idle"],
        },
    }))
    .expect("structured packet");
    assert_eq!(packet, reply("SELECT 1"));
}

#[test]
fn payload_wins_over_packet_types() {
    let packet: ResponsePacket = serde_json::from_value(json!({
        "payload": "UkQ=",
        "packet_types": ["ready_for_query"],
    }))
    .expect("raw packet");
    assert_eq!(packet.raw_payload().map(RawPayload::as_str), Some("UkQ="));
    assert!(packet.structured_response().is_none());
}

#[rstest]
#[case::empty_object(json!({}))]
#[case::empty_payload(json!({ "payload": "" }))]
#[case::empty_types(json!({ "payload": "", "packet_types": [] }))]
fn packets_without_content_are_rejected(#[case] value: serde_json::Value) {
    let err = serde_json::from_value::<ResponsePacket>(value).expect_err("no content");
    assert!(err.to_string().contains("no packet types"), "unexpected error: {err}");
}

#[rstest]
#[case::bare_string(json!(""))]
#[case::null_payload(json!({ "payload": null }))]
#[case::empty_exchange_response(json!({ "name": "x", "request": { "packets": [] }, "responses": [{}] }))]
fn empty_payloads_never_deserialize(#[case] value: serde_json::Value) {
    let packet = serde_json::from_value::<ResponsePacket>(value.clone());
    let exchange = serde_json::from_value::<RecordedExchange>(value);
    assert!(packet.is_err());
    assert!(exchange.is_err());
}

#[test]
fn packets_serialize_in_recording_layout() {
    let raw = serde_json::to_value(ResponsePacket::raw("UkQ=").expect("non-empty")).expect("serialize");
    assert_eq!(raw["payload"], "UkQ=");

    let structured = serde_json::to_value(reply("SELECT 1")).expect("serialize");
    assert!(structured.get("payload").is_none());
    assert_eq!(structured["packet_types"][0], "command_complete");
}

#[rstest]
#[case::empty_payload(ResponsePacket::raw(""), InvalidPacket::EmptyPayload)]
#[case::empty_wire(ResponsePacket::from_wire(b""), InvalidPacket::EmptyPayload)]
#[case::no_types(
    ResponsePacket::structured(StructuredResponse::default()),
    InvalidPacket::NoPacketTypes
)]
fn constructors_reject_empty_packets(
    #[case] result: Result<ResponsePacket, InvalidPacket>,
    #[case] expected: InvalidPacket,
) {
    assert_eq!(result, Err(expected));
}

#[test]
fn recorded_request_concatenates_buffers() {
    let request = RecordedRequest::from_wire([&b"Q\x00"[..], &b"\x00\x00\x05x"[..]]);
    assert_eq!(request.packets.len(), 2);
    assert_eq!(&request.wire_bytes().expect("valid base64")[..], b"Q\x00\x00\x00\x05x");
}

#[rstest]
#[tokio::test]
async fn exact_bytes_match(store: MemoryMockStore) {
    let request = query("SELECT 1");
    store.insert(exchange("select", &[request.clone()], "SELECT 1")).expect("insert");

    let found = store.find_match(&burst(&[&request])).await.expect("lookup");
    assert_eq!(found.map(|e| e.name), Some("select".to_owned()));
}

#[rstest]
#[tokio::test]
async fn split_reads_match_on_concatenated_bytes(store: MemoryMockStore) {
    let request = query("SELECT 1");
    store.insert(exchange("select", &[request.clone()], "SELECT 1")).expect("insert");

    let (head, tail) = request.split_at(3);
    let found = store.find_match(&burst(&[head, tail])).await.expect("lookup");
    assert!(found.is_some());
}

fn prepared(statement: &str) -> Bytes {
    encode_frontend(&[
        FrontendMessage::Parse {
            name: statement.into(),
            query: "SELECT $1".into(),
            parameter_oids: vec![23],
        },
        FrontendMessage::Bind {
            portal: String::new(),
            statement: statement.into(),
            parameter_formats: vec![],
            parameters: vec![Some(b"7".to_vec())],
            result_formats: vec![],
        },
        FrontendMessage::Execute {
            portal: String::new(),
            max_rows: 0,
        },
        FrontendMessage::Sync,
    ])
    .expect("encode extended query")
}

#[rstest]
#[tokio::test]
async fn statement_names_do_not_affect_matching(store: MemoryMockStore) {
    store.insert(exchange("prepared", &[prepared("s0")], "SELECT 1")).expect("insert");

    let found = store.find_match(&burst(&[&prepared("s7")])).await.expect("lookup");
    assert_eq!(found.map(|e| e.name), Some("prepared".to_owned()));
}

#[rstest]
#[tokio::test]
async fn exact_match_beats_earlier_name_insensitive_match(store: MemoryMockStore) {
    store.insert(exchange("renamed", &[prepared("s0")], "SELECT 1")).expect("insert");
    store.insert(exchange("exact", &[prepared("s1")], "SELECT 1")).expect("insert");

    let found = store.find_match(&burst(&[&prepared("s1")])).await.expect("lookup");
    assert_eq!(found.map(|e| e.name), Some("exact".to_owned()));
}

#[rstest]
#[tokio::test]
async fn unknown_request_is_not_matched(store: MemoryMockStore) {
    store
        .insert(exchange("select", &[query("SELECT 1")], "SELECT 1"))
        .expect("insert");

    let found = store.find_match(&burst(&[&query("SELECT 2")])).await.expect("lookup");
    assert!(found.is_none());
    assert_eq!(store.len(), 1);
}

#[rstest]
#[tokio::test]
async fn one_shot_mocks_replay_in_insertion_order(store: MemoryMockStore) {
    let request = query("SELECT now()");
    store.insert(exchange("first", &[request.clone()], "SELECT 1")).expect("insert");
    store.insert(exchange("second", &[request.clone()], "SELECT 1")).expect("insert");

    let mut names = Vec::new();
    for _ in 0..3 {
        names.push(store.find_match(&burst(&[&request])).await.expect("lookup").map(|e| e.name));
    }
    assert_eq!(names, vec![Some("first".to_owned()), Some("second".to_owned()), None]);
    assert!(store.is_empty());
}

#[rstest]
#[tokio::test]
async fn reusable_mocks_stay_in_the_store(store: MemoryMockStore) {
    let request = query("SELECT version()");
    store
        .insert(exchange("version", &[request.clone()], "SELECT 1").reusable(true))
        .expect("insert");

    for _ in 0..3 {
        assert!(store.find_match(&burst(&[&request])).await.expect("lookup").is_some());
    }
    assert_eq!(store.len(), 1);
}

#[rstest]
fn invalid_request_base64_is_rejected(store: MemoryMockStore) {
    let exchange = RecordedExchange::new(
        "broken",
        RecordedRequest {
            packets: vec!["***".into()],
        },
        vec![ResponsePacket::raw("UkQ=").expect("non-empty")],
    );
    let err = store.insert(exchange).expect_err("invalid base64");
    assert!(err.to_string().contains("broken"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn structured_packet_keeps_declared_types() {
    let packet = reply("INSERT 0 1");
    let response = packet.structured_response().expect("structured packet");
    assert!(packet.raw_payload().is_none());
    assert_eq!(
        response.packet_types,
        vec![PacketType::CommandComplete, PacketType::ReadyForQuery]
    );
}
