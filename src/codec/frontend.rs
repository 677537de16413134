//! Client-to-server messages.
//!
//! Bursts captured from a client usually carry several frontend messages,
//! for example the `Parse`/`Bind`/`Describe`/`Execute`/`Sync` run of the
//! extended query protocol. The first packet on a connection has no type tag
//! (startup, SSL, GSS encryption or cancel request); it is recognised by its
//! leading zero byte, which no tagged message can start with.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{
    error::{DecodeError, EncodeError},
    wire::{BodyReader, next_message, put_count, put_cstr, put_nullable, write_message},
};

/// Protocol version 3.0 as sent in a startup packet.
pub const PROTOCOL_VERSION_3: i32 = 196_608;
/// Request code of an `SSLRequest` packet.
pub const SSL_REQUEST_CODE: i32 = 80_877_103;
/// Request code of a `GSSENCRequest` packet.
pub const GSSENC_REQUEST_CODE: i32 = 80_877_104;
/// Request code of a `CancelRequest` packet.
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// Tag used in error reports about untagged startup packets.
const STARTUP_TAG: u8 = 0;

/// Object kind addressed by `Describe` and `Close`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// A prepared statement (`'S'`).
    Statement,
    /// A portal (`'P'`).
    Portal,
}

impl Target {
    fn as_byte(self) -> u8 {
        match self {
            Self::Statement => b'S',
            Self::Portal => b'P',
        }
    }

    fn read(reader: &mut BodyReader<'_>) -> Result<Self, DecodeError> {
        match reader.u8()? {
            b'S' => Ok(Self::Statement),
            b'P' => Ok(Self::Portal),
            other => Err(DecodeError::InvalidValue {
                tag: reader.tag(),
                field: "target",
                value: i64::from(other),
            }),
        }
    }
}

/// A decoded client message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrontendMessage {
    /// Untagged startup packet carrying connection parameters.
    Startup {
        /// Requested protocol version.
        protocol_version: i32,
        /// Name/value parameter pairs in wire order.
        parameters: Vec<(String, String)>,
    },
    /// Untagged request to negotiate TLS.
    SslRequest,
    /// Untagged request to negotiate GSSAPI encryption.
    GssEncRequest,
    /// Untagged request to cancel a running query on another connection.
    CancelRequest {
        /// Backend process to interrupt.
        process_id: i32,
        /// Secret key from that backend's `BackendKeyData`.
        secret_key: i32,
    },
    /// Simple query (`'Q'`).
    Query {
        /// SQL text.
        query: String,
    },
    /// Prepare a statement (`'P'`).
    Parse {
        /// Statement name, empty for the unnamed statement.
        name: String,
        /// SQL text.
        query: String,
        /// Declared parameter type OIDs.
        parameter_oids: Vec<u32>,
    },
    /// Bind parameters to a statement (`'B'`).
    Bind {
        /// Destination portal.
        portal: String,
        /// Source statement.
        statement: String,
        /// Parameter format codes.
        parameter_formats: Vec<i16>,
        /// Parameter values, `None` for SQL `NULL`.
        parameters: Vec<Option<Vec<u8>>>,
        /// Result column format codes.
        result_formats: Vec<i16>,
    },
    /// Describe a statement or portal (`'D'`).
    Describe {
        /// Kind of object.
        target: Target,
        /// Object name.
        name: String,
    },
    /// Execute a portal (`'E'`).
    Execute {
        /// Portal name.
        portal: String,
        /// Row limit, zero for no limit.
        max_rows: i32,
    },
    /// Close a statement or portal (`'C'`).
    Close {
        /// Kind of object.
        target: Target,
        /// Object name.
        name: String,
    },
    /// End of an extended-query batch (`'S'`).
    Sync,
    /// Flush pending output (`'H'`).
    Flush,
    /// Close the connection (`'X'`).
    Terminate,
    /// Password or SASL response (`'p'`), kept opaque.
    Password {
        /// Message body.
        payload: Vec<u8>,
    },
    /// `COPY FROM STDIN` data (`'d'`).
    CopyData {
        /// Raw copy data.
        data: Vec<u8>,
    },
    /// End of copy data (`'c'`).
    CopyDone,
    /// Abort a copy (`'f'`).
    CopyFail {
        /// Failure reason.
        message: String,
    },
}

impl FrontendMessage {
    /// Append the wire form of this message to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if a string holds a NUL byte or a list or
    /// body exceeds the protocol's size fields.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            Self::Startup {
                protocol_version,
                parameters,
            } => write_message(dst, None, |dst| {
                dst.put_i32(*protocol_version);
                for (name, value) in parameters {
                    put_cstr(dst, name, "startup parameter name")?;
                    put_cstr(dst, value, "startup parameter value")?;
                }
                dst.put_u8(0);
                Ok(())
            }),
            Self::SslRequest => write_message(dst, None, |dst| {
                dst.put_i32(SSL_REQUEST_CODE);
                Ok(())
            }),
            Self::GssEncRequest => write_message(dst, None, |dst| {
                dst.put_i32(GSSENC_REQUEST_CODE);
                Ok(())
            }),
            Self::CancelRequest {
                process_id,
                secret_key,
            } => write_message(dst, None, |dst| {
                dst.put_i32(CANCEL_REQUEST_CODE);
                dst.put_i32(*process_id);
                dst.put_i32(*secret_key);
                Ok(())
            }),
            Self::Query { query } => write_message(dst, Some(b'Q'), |dst| put_cstr(dst, query, "query")),
            Self::Parse {
                name,
                query,
                parameter_oids,
            } => write_message(dst, Some(b'P'), |dst| {
                put_cstr(dst, name, "statement name")?;
                put_cstr(dst, query, "query")?;
                put_count(dst, parameter_oids.len(), "parameter oids")?;
                for oid in parameter_oids {
                    dst.put_u32(*oid);
                }
                Ok(())
            }),
            Self::Bind {
                portal,
                statement,
                parameter_formats,
                parameters,
                result_formats,
            } => write_message(dst, Some(b'B'), |dst| {
                put_cstr(dst, portal, "portal name")?;
                put_cstr(dst, statement, "statement name")?;
                put_count(dst, parameter_formats.len(), "parameter formats")?;
                for format in parameter_formats {
                    dst.put_i16(*format);
                }
                put_count(dst, parameters.len(), "parameters")?;
                for value in parameters {
                    put_nullable(dst, value.as_deref())?;
                }
                put_count(dst, result_formats.len(), "result formats")?;
                for format in result_formats {
                    dst.put_i16(*format);
                }
                Ok(())
            }),
            Self::Describe { target, name } => write_message(dst, Some(b'D'), |dst| {
                dst.put_u8(target.as_byte());
                put_cstr(dst, name, "describe name")
            }),
            Self::Execute { portal, max_rows } => write_message(dst, Some(b'E'), |dst| {
                put_cstr(dst, portal, "portal name")?;
                dst.put_i32(*max_rows);
                Ok(())
            }),
            Self::Close { target, name } => write_message(dst, Some(b'C'), |dst| {
                dst.put_u8(target.as_byte());
                put_cstr(dst, name, "close name")
            }),
            Self::Sync => write_message(dst, Some(b'S'), |_| Ok(())),
            Self::Flush => write_message(dst, Some(b'H'), |_| Ok(())),
            Self::Terminate => write_message(dst, Some(b'X'), |_| Ok(())),
            Self::Password { payload } => write_message(dst, Some(b'p'), |dst| {
                dst.put_slice(payload);
                Ok(())
            }),
            Self::CopyData { data } => write_message(dst, Some(b'd'), |dst| {
                dst.put_slice(data);
                Ok(())
            }),
            Self::CopyDone => write_message(dst, Some(b'c'), |_| Ok(())),
            Self::CopyFail { message } => {
                write_message(dst, Some(b'f'), |dst| put_cstr(dst, message, "copy failure message"))
            }
        }
    }
}

/// Decode every client message in `src`.
///
/// # Errors
///
/// Returns a [`DecodeError`] for a truncated header, an unknown tag, a length
/// field exceeding the buffer, or a malformed body.
///
/// # Examples
///
/// ```
/// use replayframe::codec::{FrontendMessage, decode_frontend};
///
/// let bytes = b"Q\x00\x00\x00\x0dSELECT 1\x00";
/// let messages = decode_frontend(bytes).expect("valid query");
/// assert_eq!(
///     messages,
///     vec![FrontendMessage::Query {
///         query: "SELECT 1".into()
///     }]
/// );
/// ```
pub fn decode_frontend(mut src: &[u8]) -> Result<Vec<FrontendMessage>, DecodeError> {
    let mut messages = Vec::new();
    if src.first() == Some(&0) {
        messages.push(decode_untagged(&mut src)?);
    }
    while !src.is_empty() {
        let raw = next_message(&mut src)?;
        messages.push(decode_tagged(raw.tag, raw.body)?);
    }
    Ok(messages)
}

/// Encode a sequence of client messages into one buffer.
///
/// # Errors
///
/// Returns the first [`EncodeError`] raised by [`FrontendMessage::encode`].
pub fn encode_frontend(messages: &[FrontendMessage]) -> Result<Bytes, EncodeError> {
    let mut dst = BytesMut::new();
    for message in messages {
        message.encode(&mut dst)?;
    }
    Ok(dst.freeze())
}

fn decode_untagged(src: &mut &[u8]) -> Result<FrontendMessage, DecodeError> {
    let mut header = BodyReader::new(STARTUP_TAG, *src);
    let length = header.i32()?;
    let body_len = usize::try_from(length)
        .ok()
        .and_then(|len| len.checked_sub(4))
        .ok_or(DecodeError::InvalidLength {
            tag: STARTUP_TAG,
            length,
        })?;
    let remaining = src.len() - 4;
    if body_len > remaining {
        return Err(DecodeError::LengthOverrun {
            tag: STARTUP_TAG,
            declared: body_len,
            remaining,
        });
    }
    let (packet, rest) = src.split_at(4 + body_len);
    *src = rest;

    let mut body = BodyReader::new(STARTUP_TAG, &packet[4..]);
    let code = body.i32()?;
    let message = match code {
        SSL_REQUEST_CODE => FrontendMessage::SslRequest,
        GSSENC_REQUEST_CODE => FrontendMessage::GssEncRequest,
        CANCEL_REQUEST_CODE => FrontendMessage::CancelRequest {
            process_id: body.i32()?,
            secret_key: body.i32()?,
        },
        protocol_version => {
            let mut parameters = Vec::new();
            loop {
                let name = body.cstr()?;
                if name.is_empty() {
                    break;
                }
                parameters.push((name, body.cstr()?));
            }
            FrontendMessage::Startup {
                protocol_version,
                parameters,
            }
        }
    };
    body.finish()?;
    Ok(message)
}

fn decode_tagged(tag: u8, body: &[u8]) -> Result<FrontendMessage, DecodeError> {
    let mut r = BodyReader::new(tag, body);
    let message = match tag {
        b'Q' => FrontendMessage::Query { query: r.cstr()? },
        b'P' => {
            let name = r.cstr()?;
            let query = r.cstr()?;
            let count = r.count("parameter oids")?;
            let parameter_oids = (0..count).map(|_| r.u32()).collect::<Result<_, _>>()?;
            FrontendMessage::Parse {
                name,
                query,
                parameter_oids,
            }
        }
        b'B' => {
            let portal = r.cstr()?;
            let statement = r.cstr()?;
            let count = r.count("parameter formats")?;
            let parameter_formats = (0..count).map(|_| r.i16()).collect::<Result<_, _>>()?;
            let count = r.count("parameters")?;
            let parameters = (0..count).map(|_| r.nullable()).collect::<Result<_, _>>()?;
            let count = r.count("result formats")?;
            let result_formats = (0..count).map(|_| r.i16()).collect::<Result<_, _>>()?;
            FrontendMessage::Bind {
                portal,
                statement,
                parameter_formats,
                parameters,
                result_formats,
            }
        }
        b'D' => FrontendMessage::Describe {
            target: Target::read(&mut r)?,
            name: r.cstr()?,
        },
        b'E' => FrontendMessage::Execute {
            portal: r.cstr()?,
            max_rows: r.i32()?,
        },
        b'C' => FrontendMessage::Close {
            target: Target::read(&mut r)?,
            name: r.cstr()?,
        },
        b'S' => FrontendMessage::Sync,
        b'H' => FrontendMessage::Flush,
        b'X' => FrontendMessage::Terminate,
        b'p' => FrontendMessage::Password {
            payload: r.rest().to_vec(),
        },
        b'd' => FrontendMessage::CopyData {
            data: r.rest().to_vec(),
        },
        b'c' => FrontendMessage::CopyDone,
        b'f' => FrontendMessage::CopyFail { message: r.cstr()? },
        other => return Err(DecodeError::UnknownPacketType { tag: other }),
    };
    r.finish()?;
    Ok(message)
}
