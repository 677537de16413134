//! Recorded exchanges and the mock store contract.
//!
//! A [`RecordedExchange`] pairs the request buffers captured while recording
//! with the [`ResponsePacket`]s the real server sent back. Sessions only read
//! exchanges; recording them and deciding how a live burst corresponds to one
//! is the [`MockStore`]'s job.

mod memory;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
pub use memory::{MemoryMockStore, MockId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec::{DecodeError, StructuredResponse},
    framer::RequestBurst,
};

/// Error returned by a [`MockStore`] that could not complete a lookup.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Source of recorded exchanges for live bursts.
///
/// Implementations are shared by every concurrent session and must provide
/// their own synchronisation.
#[async_trait]
pub trait MockStore: Send + Sync + 'static {
    /// Find the exchange that answers `burst`.
    ///
    /// Returns `Ok(None)` when nothing was recorded for the burst.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store itself fails.
    async fn find_match(&self, burst: &RequestBurst) -> Result<Option<RecordedExchange>, StoreError>;
}

/// Base64 text of the on-wire bytes of a packet.
///
/// Only [`ResponsePacket::raw`] creates one, so the text is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPayload(String);

impl RawPayload {
    /// The base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }

    /// Decode the payload into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Base64`] if the text is not valid base64.
    pub fn decode(&self) -> Result<Bytes, DecodeError> { Ok(Bytes::from(STANDARD.decode(&self.0)?)) }
}

/// Reason a [`ResponsePacket`] could not be constructed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidPacket {
    /// A raw packet with an empty payload.
    #[error("raw response packet has an empty payload")]
    EmptyPayload,
    /// A structured packet without any packet type.
    #[error("structured response packet declares no packet types")]
    NoPacketTypes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PacketForm {
    Raw(RawPayload),
    Structured(StructuredResponse),
}

/// One recorded response, replayed as a unit.
///
/// Exactly one form is populated, and the constructors and deserialisation
/// are the only ways to build a packet. A recording that declares packet
/// types but carries no raw payload is always structured, so it is re-encoded
/// rather than written as zero bytes.
///
/// # Examples
///
/// ```
/// use replayframe::mock::{InvalidPacket, ResponsePacket};
///
/// let packet = ResponsePacket::raw("UkQ=").expect("non-empty payload");
/// assert_eq!(packet.raw_payload().map(|raw| raw.as_str()), Some("UkQ="));
/// assert_eq!(ResponsePacket::raw(""), Err(InvalidPacket::EmptyPayload));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredPacket", into = "StoredPacket")]
pub struct ResponsePacket(PacketForm);

impl ResponsePacket {
    /// Build a raw packet from base64 text.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPacket::EmptyPayload`] if `payload` is empty.
    pub fn raw(payload: impl Into<String>) -> Result<Self, InvalidPacket> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(InvalidPacket::EmptyPayload);
        }
        Ok(Self(PacketForm::Raw(RawPayload(payload))))
    }

    /// Build a raw packet from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPacket::EmptyPayload`] if `bytes` is empty.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, InvalidPacket> { Self::raw(STANDARD.encode(bytes)) }

    /// Build a structured packet.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPacket::NoPacketTypes`] if `response` declares no
    /// packet types.
    pub fn structured(response: StructuredResponse) -> Result<Self, InvalidPacket> {
        if response.packet_types.is_empty() {
            return Err(InvalidPacket::NoPacketTypes);
        }
        Ok(Self(PacketForm::Structured(response)))
    }

    /// The base64 payload of a raw packet.
    #[must_use]
    pub fn raw_payload(&self) -> Option<&RawPayload> {
        match &self.0 {
            PacketForm::Raw(raw) => Some(raw),
            PacketForm::Structured(_) => None,
        }
    }

    /// The packet types and field values of a structured packet.
    #[must_use]
    pub fn structured_response(&self) -> Option<&StructuredResponse> {
        match &self.0 {
            PacketForm::Raw(_) => None,
            PacketForm::Structured(response) => Some(response),
        }
    }

    pub(crate) fn form(&self) -> &PacketForm { &self.0 }
}

/// Recording-file layout of a response packet.
///
/// Recorders write both forms side by side; the raw payload wins when it is
/// present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoredPacket {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    payload: String,
    #[serde(flatten)]
    structured: StructuredResponse,
}

impl TryFrom<StoredPacket> for ResponsePacket {
    type Error = InvalidPacket;

    fn try_from(stored: StoredPacket) -> Result<Self, Self::Error> {
        if stored.payload.is_empty() {
            Self::structured(stored.structured)
        } else {
            Self::raw(stored.payload)
        }
    }
}

impl From<ResponsePacket> for StoredPacket {
    fn from(packet: ResponsePacket) -> Self {
        match packet.0 {
            PacketForm::Raw(RawPayload(payload)) => Self {
                payload,
                ..Self::default()
            },
            PacketForm::Structured(structured) => Self {
                payload: String::new(),
                structured,
            },
        }
    }
}

/// Request side of a recorded exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// Base64 text of each request buffer, in the order it was captured.
    pub packets: Vec<String>,
}

impl RecordedRequest {
    /// Record the given wire buffers.
    pub fn from_wire<I, B>(buffers: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            packets: buffers.into_iter().map(|b| STANDARD.encode(b.as_ref())).collect(),
        }
    }

    /// Concatenated wire bytes of every recorded buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Base64`] if a buffer is not valid base64.
    pub fn wire_bytes(&self) -> Result<Bytes, DecodeError> {
        let mut out = Vec::new();
        for packet in &self.packets {
            STANDARD.decode_vec(packet, &mut out)?;
        }
        Ok(Bytes::from(out))
    }
}

/// A recorded request and the responses sent for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedExchange {
    /// Name used in logs.
    pub name: String,
    /// What the client sent.
    pub request: RecordedRequest,
    /// What the server answered, in order.
    pub responses: Vec<ResponsePacket>,
    /// Whether stores may replay this exchange more than once.
    #[serde(default)]
    pub reusable: bool,
}

impl RecordedExchange {
    /// Create a one-shot exchange.
    pub fn new(name: impl Into<String>, request: RecordedRequest, responses: Vec<ResponsePacket>) -> Self {
        Self {
            name: name.into(),
            request,
            responses,
            reusable: false,
        }
    }

    /// Allow the exchange to be replayed any number of times.
    #[must_use]
    pub fn reusable(mut self, reusable: bool) -> Self {
        self.reusable = reusable;
        self
    }
}

#[cfg(test)]
mod tests;
