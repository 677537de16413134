//! PostgreSQL message codec.
//!
//! Decodes raw protocol bytes into structured messages and encodes recorded
//! responses back into wire bytes. Framing of live traffic is not the codec's
//! concern: the [`framer`](crate::framer) groups reads into bursts by timing,
//! and the codec is only applied to complete buffers.
//!
//! # Wire layout
//!
//! Every message after the startup phase is a one-byte type tag, a 4-byte
//! big-endian length that includes itself, and the body. Frontend and backend
//! messages reuse tags (`'D'` is `Describe` from a client but `DataRow` from a
//! server), so each direction has its own decoder.

use bytes::Bytes;

pub mod backend;
pub mod error;
pub mod frontend;
pub mod response;
mod wire;

pub use backend::{
    Authentication,
    BackendKeyData,
    BackendMessage,
    FieldDescription,
    NoticeField,
    PacketType,
    ParameterStatus,
    TransactionStatus,
    decode_backend,
    encode_backend,
};
pub use error::{CodecError, DecodeError, EncodeError};
pub use frontend::{FrontendMessage, Target, decode_frontend, encode_frontend};
pub use response::{ResponseFields, StructuredResponse, decode_response, encode_response};

use crate::mock::{PacketForm, ResponsePacket};

/// Produce the wire bytes of a recorded response packet.
///
/// Raw packets are base64-decoded as-is; structured packets are re-encoded
/// from their packet types and field values.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if a raw payload is not valid base64 and
/// [`CodecError::Encode`] if a structured packet cannot be encoded.
///
/// # Examples
///
/// ```
/// use replayframe::{codec::encode_packet, mock::ResponsePacket};
///
/// let packet = ResponsePacket::from_wire(b"Z\x00\x00\x00\x05I").expect("non-empty payload");
/// let bytes = encode_packet(&packet).expect("valid base64");
/// assert_eq!(&bytes[..], b"Z\x00\x00\x00\x05I");
/// ```
pub fn encode_packet(packet: &ResponsePacket) -> Result<Bytes, CodecError> {
    match packet.form() {
        PacketForm::Raw(payload) => Ok(payload.decode()?),
        PacketForm::Structured(response) => Ok(encode_response(response)?),
    }
}
