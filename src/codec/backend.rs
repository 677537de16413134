//! Server-to-client messages.
//!
//! These are the messages a recorded response replays. Each variant of
//! [`BackendMessage`] maps to one [`PacketType`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{
    error::{DecodeError, EncodeError},
    wire::{BodyReader, next_message, put_count, put_cstr, put_nullable, write_message},
};

/// Type of a backend message, identified on the wire by its tag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    /// `'R'`
    Authentication,
    /// `'K'`
    BackendKeyData,
    /// `'2'`
    BindComplete,
    /// `'3'`
    CloseComplete,
    /// `'C'`
    CommandComplete,
    /// `'D'`
    DataRow,
    /// `'I'`
    EmptyQueryResponse,
    /// `'E'`
    ErrorResponse,
    /// `'n'`
    NoData,
    /// `'N'`
    NoticeResponse,
    /// `'t'`
    ParameterDescription,
    /// `'S'`
    ParameterStatus,
    /// `'1'`
    ParseComplete,
    /// `'s'`
    PortalSuspended,
    /// `'Z'`
    ReadyForQuery,
    /// `'T'`
    RowDescription,
}

impl PacketType {
    /// Wire tag of this packet type.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Authentication => b'R',
            Self::BackendKeyData => b'K',
            Self::BindComplete => b'2',
            Self::CloseComplete => b'3',
            Self::CommandComplete => b'C',
            Self::DataRow => b'D',
            Self::EmptyQueryResponse => b'I',
            Self::ErrorResponse => b'E',
            Self::NoData => b'n',
            Self::NoticeResponse => b'N',
            Self::ParameterDescription => b't',
            Self::ParameterStatus => b'S',
            Self::ParseComplete => b'1',
            Self::PortalSuspended => b's',
            Self::ReadyForQuery => b'Z',
            Self::RowDescription => b'T',
        }
    }

    /// Packet type for a wire tag, if the tag names a backend message.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        let packet_type = match tag {
            b'R' => Self::Authentication,
            b'K' => Self::BackendKeyData,
            b'2' => Self::BindComplete,
            b'3' => Self::CloseComplete,
            b'C' => Self::CommandComplete,
            b'D' => Self::DataRow,
            b'I' => Self::EmptyQueryResponse,
            b'E' => Self::ErrorResponse,
            b'n' => Self::NoData,
            b'N' => Self::NoticeResponse,
            b't' => Self::ParameterDescription,
            b'S' => Self::ParameterStatus,
            b'1' => Self::ParseComplete,
            b's' => Self::PortalSuspended,
            b'Z' => Self::ReadyForQuery,
            b'T' => Self::RowDescription,
            _ => return None,
        };
        Some(packet_type)
    }
}

/// Body of an `Authentication` message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Authentication request code (`0` for `AuthenticationOk`).
    pub code: i32,
    /// Method-specific data following the code, such as an MD5 salt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

/// Body of a `BackendKeyData` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendKeyData {
    /// Backend process id.
    pub process_id: i32,
    /// Cancellation secret.
    pub secret_key: i32,
}

/// One field of an `ErrorResponse` or `NoticeResponse`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeField {
    /// Field code byte, for example `b'M'` for the message text.
    pub code: u8,
    /// Field value.
    pub value: String,
}

/// A `ParameterStatus` report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterStatus {
    /// Run-time parameter name.
    pub name: String,
    /// Current value.
    pub value: String,
}

/// Column metadata inside a `RowDescription`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// Column name.
    pub name: String,
    /// OID of the source table, zero if none.
    pub table_oid: u32,
    /// Attribute number in the source table, zero if none.
    pub column_attribute: i16,
    /// OID of the column's data type.
    pub type_oid: u32,
    /// Data type size, negative for variable width.
    pub type_size: i16,
    /// Type modifier.
    pub type_modifier: i32,
    /// Format code, `0` for text and `1` for binary.
    pub format: i16,
}

/// Transaction state reported by `ReadyForQuery`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// `'I'`: not in a transaction block.
    Idle,
    /// `'T'`: inside a transaction block.
    InTransaction,
    /// `'E'`: inside a failed transaction block.
    Failed,
}

impl TransactionStatus {
    fn as_byte(self) -> u8 {
        match self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(Self::Idle),
            b'T' => Some(Self::InTransaction),
            b'E' => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A decoded server message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendMessage {
    /// Authentication request or confirmation.
    Authentication(Authentication),
    /// Cancellation key for this backend.
    BackendKeyData(BackendKeyData),
    /// `Bind` completed.
    BindComplete,
    /// `Close` completed.
    CloseComplete,
    /// A command finished; carries the command tag such as `SELECT 1`.
    CommandComplete(String),
    /// One result row; `None` marks SQL `NULL`.
    DataRow(Vec<Option<Vec<u8>>>),
    /// The query string was empty.
    EmptyQueryResponse,
    /// An error report.
    ErrorResponse(Vec<NoticeField>),
    /// The described statement or portal returns no rows.
    NoData,
    /// A notice report.
    NoticeResponse(Vec<NoticeField>),
    /// Parameter type OIDs of a described statement.
    ParameterDescription(Vec<u32>),
    /// A run-time parameter value.
    ParameterStatus(ParameterStatus),
    /// `Parse` completed.
    ParseComplete,
    /// `Execute` hit its row limit.
    PortalSuspended,
    /// The backend is ready for a new query.
    ReadyForQuery(TransactionStatus),
    /// Column layout of the rows that follow.
    RowDescription(Vec<FieldDescription>),
}

impl BackendMessage {
    /// Packet type of this message.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Authentication(_) => PacketType::Authentication,
            Self::BackendKeyData(_) => PacketType::BackendKeyData,
            Self::BindComplete => PacketType::BindComplete,
            Self::CloseComplete => PacketType::CloseComplete,
            Self::CommandComplete(_) => PacketType::CommandComplete,
            Self::DataRow(_) => PacketType::DataRow,
            Self::EmptyQueryResponse => PacketType::EmptyQueryResponse,
            Self::ErrorResponse(_) => PacketType::ErrorResponse,
            Self::NoData => PacketType::NoData,
            Self::NoticeResponse(_) => PacketType::NoticeResponse,
            Self::ParameterDescription(_) => PacketType::ParameterDescription,
            Self::ParameterStatus(_) => PacketType::ParameterStatus,
            Self::ParseComplete => PacketType::ParseComplete,
            Self::PortalSuspended => PacketType::PortalSuspended,
            Self::ReadyForQuery(_) => PacketType::ReadyForQuery,
            Self::RowDescription(_) => PacketType::RowDescription,
        }
    }

    /// Append the wire form of this message to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if a string holds a NUL byte or a list or
    /// body exceeds the protocol's size fields.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let tag = Some(self.packet_type().tag());
        write_message(dst, tag, |dst| match self {
            Self::Authentication(auth) => {
                dst.put_i32(auth.code);
                dst.put_slice(&auth.data);
                Ok(())
            }
            Self::BackendKeyData(key) => {
                dst.put_i32(key.process_id);
                dst.put_i32(key.secret_key);
                Ok(())
            }
            Self::BindComplete
            | Self::CloseComplete
            | Self::EmptyQueryResponse
            | Self::NoData
            | Self::ParseComplete
            | Self::PortalSuspended => Ok(()),
            Self::CommandComplete(tag) => put_cstr(dst, tag, "command tag"),
            Self::DataRow(values) => {
                put_count(dst, values.len(), "data row values")?;
                for value in values {
                    put_nullable(dst, value.as_deref())?;
                }
                Ok(())
            }
            Self::ErrorResponse(fields) | Self::NoticeResponse(fields) => {
                for field in fields {
                    if field.code == 0 {
                        return Err(EncodeError::InteriorNul {
                            field: "notice field code",
                        });
                    }
                    dst.put_u8(field.code);
                    put_cstr(dst, &field.value, "notice field value")?;
                }
                dst.put_u8(0);
                Ok(())
            }
            Self::ParameterDescription(oids) => {
                put_count(dst, oids.len(), "parameter oids")?;
                for oid in oids {
                    dst.put_u32(*oid);
                }
                Ok(())
            }
            Self::ParameterStatus(status) => {
                put_cstr(dst, &status.name, "parameter name")?;
                put_cstr(dst, &status.value, "parameter value")
            }
            Self::ReadyForQuery(status) => {
                dst.put_u8(status.as_byte());
                Ok(())
            }
            Self::RowDescription(fields) => {
                put_count(dst, fields.len(), "row description fields")?;
                for field in fields {
                    put_cstr(dst, &field.name, "column name")?;
                    dst.put_u32(field.table_oid);
                    dst.put_i16(field.column_attribute);
                    dst.put_u32(field.type_oid);
                    dst.put_i16(field.type_size);
                    dst.put_i32(field.type_modifier);
                    dst.put_i16(field.format);
                }
                Ok(())
            }
        })
    }

    fn decode(tag: u8, body: &[u8]) -> Result<Self, DecodeError> {
        let packet_type = PacketType::from_tag(tag).ok_or(DecodeError::UnknownPacketType { tag })?;
        let mut r = BodyReader::new(tag, body);
        let message = match packet_type {
            PacketType::Authentication => Self::Authentication(Authentication {
                code: r.i32()?,
                data: r.rest().to_vec(),
            }),
            PacketType::BackendKeyData => Self::BackendKeyData(BackendKeyData {
                process_id: r.i32()?,
                secret_key: r.i32()?,
            }),
            PacketType::BindComplete => Self::BindComplete,
            PacketType::CloseComplete => Self::CloseComplete,
            PacketType::CommandComplete => Self::CommandComplete(r.cstr()?),
            PacketType::DataRow => {
                let count = r.count("data row values")?;
                Self::DataRow((0..count).map(|_| r.nullable()).collect::<Result<_, _>>()?)
            }
            PacketType::EmptyQueryResponse => Self::EmptyQueryResponse,
            PacketType::ErrorResponse => Self::ErrorResponse(read_notice_fields(&mut r)?),
            PacketType::NoData => Self::NoData,
            PacketType::NoticeResponse => Self::NoticeResponse(read_notice_fields(&mut r)?),
            PacketType::ParameterDescription => {
                let count = r.count("parameter oids")?;
                Self::ParameterDescription((0..count).map(|_| r.u32()).collect::<Result<_, _>>()?)
            }
            PacketType::ParameterStatus => Self::ParameterStatus(ParameterStatus {
                name: r.cstr()?,
                value: r.cstr()?,
            }),
            PacketType::ParseComplete => Self::ParseComplete,
            PacketType::PortalSuspended => Self::PortalSuspended,
            PacketType::ReadyForQuery => {
                let byte = r.u8()?;
                let status = TransactionStatus::from_byte(byte).ok_or(DecodeError::InvalidValue {
                    tag,
                    field: "transaction status",
                    value: i64::from(byte),
                })?;
                Self::ReadyForQuery(status)
            }
            PacketType::RowDescription => {
                let count = r.count("row description fields")?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    fields.push(FieldDescription {
                        name: r.cstr()?,
                        table_oid: r.u32()?,
                        column_attribute: r.i16()?,
                        type_oid: r.u32()?,
                        type_size: r.i16()?,
                        type_modifier: r.i32()?,
                        format: r.i16()?,
                    });
                }
                Self::RowDescription(fields)
            }
        };
        r.finish()?;
        Ok(message)
    }
}

fn read_notice_fields(r: &mut BodyReader<'_>) -> Result<Vec<NoticeField>, DecodeError> {
    let mut fields = Vec::new();
    loop {
        let code = r.u8()?;
        if code == 0 {
            return Ok(fields);
        }
        fields.push(NoticeField {
            code,
            value: r.cstr()?,
        });
    }
}

/// Decode every server message in `src`.
///
/// # Errors
///
/// Returns a [`DecodeError`] for a truncated header, an unknown tag, a length
/// field exceeding the buffer, or a malformed body.
pub fn decode_backend(mut src: &[u8]) -> Result<Vec<BackendMessage>, DecodeError> {
    let mut messages = Vec::new();
    while !src.is_empty() {
        let raw = next_message(&mut src)?;
        messages.push(BackendMessage::decode(raw.tag, raw.body)?);
    }
    Ok(messages)
}

/// Encode a sequence of server messages into one buffer.
///
/// # Errors
///
/// Returns the first [`EncodeError`] raised by [`BackendMessage::encode`].
pub fn encode_backend(messages: &[BackendMessage]) -> Result<Bytes, EncodeError> {
    let mut dst = BytesMut::new();
    for message in messages {
        message.encode(&mut dst)?;
    }
    Ok(dst.freeze())
}
