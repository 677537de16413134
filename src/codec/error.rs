//! Error types for the PostgreSQL codec.
//!
//! [`DecodeError`] covers bytes that do not form valid protocol messages
//! (including recorded base64 payloads that are not valid base64), while
//! [`EncodeError`] covers structured responses that cannot be turned back into
//! wire bytes. [`CodecError`] wraps both for call sites that do either.

use thiserror::Error;

use super::backend::PacketType;

/// Failures while turning bytes into protocol messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than the five header bytes (tag and length) remain.
    #[error("truncated message header: have {have} of 5 bytes")]
    TruncatedHeader {
        /// Bytes available where a header was expected.
        have: usize,
    },

    /// The type tag does not name a message this codec understands.
    #[error("unknown packet type {:?}", char::from(*.tag))]
    UnknownPacketType {
        /// Offending type tag.
        tag: u8,
    },

    /// The length field is smaller than the length field itself.
    #[error("invalid length {length} for packet type {:?}", char::from(*.tag))]
    InvalidLength {
        /// Type tag of the message.
        tag: u8,
        /// Length as found on the wire.
        length: i32,
    },

    /// The length field declares more body bytes than the buffer holds.
    #[error(
        "packet type {:?} declares {declared} body bytes but only {remaining} remain",
        char::from(*.tag)
    )]
    LengthOverrun {
        /// Type tag of the message.
        tag: u8,
        /// Body length declared by the header.
        declared: usize,
        /// Bytes left in the buffer after the header.
        remaining: usize,
    },

    /// A field runs past the end of the message body.
    #[error("packet type {:?} body truncated: {needed} more bytes needed", char::from(*.tag))]
    TruncatedBody {
        /// Type tag of the message.
        tag: u8,
        /// Bytes missing to complete the field.
        needed: usize,
    },

    /// A string field is not NUL terminated.
    #[error("packet type {:?} has an unterminated string", char::from(*.tag))]
    MissingTerminator {
        /// Type tag of the message.
        tag: u8,
    },

    /// A string field is not valid UTF-8.
    #[error("packet type {:?} has a string that is not UTF-8", char::from(*.tag))]
    InvalidUtf8 {
        /// Type tag of the message.
        tag: u8,
    },

    /// A field carries a value outside its allowed set.
    #[error("packet type {:?} has invalid {field} value {value}", char::from(*.tag))]
    InvalidValue {
        /// Type tag of the message.
        tag: u8,
        /// Name of the offending field.
        field: &'static str,
        /// Value found on the wire.
        value: i64,
    },

    /// Bytes remain in a body after every field was read.
    #[error("packet type {:?} has {count} trailing bytes", char::from(*.tag))]
    TrailingBytes {
        /// Type tag of the message.
        tag: u8,
        /// Unread byte count.
        count: usize,
    },

    /// A recorded raw payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Failures while turning structured messages into bytes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// A structured response without any packet type.
    #[error("structured response declares no packet types")]
    EmptyPacketTypes,

    /// A declared packet type has no recorded value left to encode.
    #[error("no {field} value recorded for packet type {packet_type:?} at position {position}")]
    MissingField {
        /// Packet type that needed the value.
        packet_type: PacketType,
        /// Name of the recorded field list that ran out.
        field: &'static str,
        /// Index of the packet type in the declared sequence.
        position: usize,
    },

    /// A string field contains an interior NUL byte.
    #[error("{field} contains a NUL byte")]
    InteriorNul {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A list is longer than its 16-bit count field allows.
    #[error("{field} holds {count} values, more than the protocol allows")]
    TooManyValues {
        /// Name of the offending field.
        field: &'static str,
        /// Number of values in the list.
        count: usize,
    },

    /// A message body is larger than its 32-bit length field allows.
    #[error("message of {size} bytes exceeds the protocol limit")]
    Oversized {
        /// Size of the encoded message.
        size: usize,
    },
}

/// Either direction of codec failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Encoding failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
