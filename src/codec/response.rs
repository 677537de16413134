//! Structured form of a recorded response.
//!
//! A recording stores the ordered packet types of a response separately from
//! the field values, which are grouped by kind (all data rows together, all
//! command tags together, and so on). Encoding walks the packet types and
//! consumes the next value of the matching kind, so a recording that declares
//! a packet type without a value for it cannot be encoded.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{
    backend::{
        Authentication,
        BackendKeyData,
        BackendMessage,
        FieldDescription,
        NoticeField,
        PacketType,
        ParameterStatus,
        TransactionStatus,
        decode_backend,
    },
    error::{DecodeError, EncodeError},
};

/// Field values of a structured response, grouped by kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseFields {
    /// Values for `Authentication` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<Authentication>,
    /// Values for `BackendKeyData` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backend_key_data: Vec<BackendKeyData>,
    /// Command tags for `CommandComplete` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command_complete: Vec<String>,
    /// Rows for `DataRow` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_rows: Vec<Vec<Option<Vec<u8>>>>,
    /// Fields for `ErrorResponse` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_responses: Vec<Vec<NoticeField>>,
    /// Fields for `NoticeResponse` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notice_responses: Vec<Vec<NoticeField>>,
    /// OID lists for `ParameterDescription` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameter_descriptions: Vec<Vec<u32>>,
    /// Values for `ParameterStatus` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameter_statuses: Vec<ParameterStatus>,
    /// Statuses for `ReadyForQuery` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ready_for_query: Vec<TransactionStatus>,
    /// Column layouts for `RowDescription` packets.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub row_descriptions: Vec<Vec<FieldDescription>>,
}

/// A response recorded as packet types plus field values.
///
/// # Examples
///
/// ```
/// use replayframe::codec::{BackendMessage, StructuredResponse, TransactionStatus};
///
/// let response = StructuredResponse::from_messages([
///     BackendMessage::CommandComplete("SELECT 0".into()),
///     BackendMessage::ReadyForQuery(TransactionStatus::Idle),
/// ]);
/// assert_eq!(response.fields.command_complete, vec!["SELECT 0".to_owned()]);
/// assert_eq!(response.messages().expect("complete recording").len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// Packet types in the order they are sent.
    #[serde(default)]
    pub packet_types: Vec<PacketType>,
    /// Values consumed by the packet types that carry fields.
    #[serde(default)]
    pub fields: ResponseFields,
}

impl StructuredResponse {
    /// Build a structured response from decoded messages.
    pub fn from_messages(messages: impl IntoIterator<Item = BackendMessage>) -> Self {
        let mut response = Self::default();
        for message in messages {
            response.push(message);
        }
        response
    }

    /// Append one message, recording both its type and its fields.
    pub fn push(&mut self, message: BackendMessage) {
        self.packet_types.push(message.packet_type());
        let fields = &mut self.fields;
        match message {
            BackendMessage::Authentication(auth) => fields.authentication.push(auth),
            BackendMessage::BackendKeyData(key) => fields.backend_key_data.push(key),
            BackendMessage::CommandComplete(tag) => fields.command_complete.push(tag),
            BackendMessage::DataRow(row) => fields.data_rows.push(row),
            BackendMessage::ErrorResponse(notice) => fields.error_responses.push(notice),
            BackendMessage::NoticeResponse(notice) => fields.notice_responses.push(notice),
            BackendMessage::ParameterDescription(oids) => fields.parameter_descriptions.push(oids),
            BackendMessage::ParameterStatus(status) => fields.parameter_statuses.push(status),
            BackendMessage::ReadyForQuery(status) => fields.ready_for_query.push(status),
            BackendMessage::RowDescription(columns) => fields.row_descriptions.push(columns),
            BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::EmptyQueryResponse
            | BackendMessage::NoData
            | BackendMessage::ParseComplete
            | BackendMessage::PortalSuspended => {}
        }
    }

    /// Pair each declared packet type with its recorded field values.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::MissingField`] when a packet type has no value
    /// left in its field list.
    pub fn messages(&self) -> Result<Vec<BackendMessage>, EncodeError> {
        let f = &self.fields;
        let mut authentication = f.authentication.iter();
        let mut backend_key_data = f.backend_key_data.iter();
        let mut command_complete = f.command_complete.iter();
        let mut data_rows = f.data_rows.iter();
        let mut error_responses = f.error_responses.iter();
        let mut notice_responses = f.notice_responses.iter();
        let mut parameter_descriptions = f.parameter_descriptions.iter();
        let mut parameter_statuses = f.parameter_statuses.iter();
        let mut ready_for_query = f.ready_for_query.iter();
        let mut row_descriptions = f.row_descriptions.iter();

        self.packet_types
            .iter()
            .enumerate()
            .map(|(position, &packet_type)| {
                let missing = |field| EncodeError::MissingField {
                    packet_type,
                    field,
                    position,
                };
                let message = match packet_type {
                    PacketType::Authentication => BackendMessage::Authentication(
                        authentication.next().cloned().ok_or_else(|| missing("authentication"))?,
                    ),
                    PacketType::BackendKeyData => BackendMessage::BackendKeyData(
                        *backend_key_data.next().ok_or_else(|| missing("backend_key_data"))?,
                    ),
                    PacketType::CommandComplete => BackendMessage::CommandComplete(
                        command_complete.next().cloned().ok_or_else(|| missing("command_complete"))?,
                    ),
                    PacketType::DataRow => BackendMessage::DataRow(
                        data_rows.next().cloned().ok_or_else(|| missing("data_rows"))?,
                    ),
                    PacketType::ErrorResponse => BackendMessage::ErrorResponse(
                        error_responses.next().cloned().ok_or_else(|| missing("error_responses"))?,
                    ),
                    PacketType::NoticeResponse => BackendMessage::NoticeResponse(
                        notice_responses.next().cloned().ok_or_else(|| missing("notice_responses"))?,
                    ),
                    PacketType::ParameterDescription => BackendMessage::ParameterDescription(
                        parameter_descriptions
                            .next()
                            .cloned()
                            .ok_or_else(|| missing("parameter_descriptions"))?,
                    ),
                    PacketType::ParameterStatus => BackendMessage::ParameterStatus(
                        parameter_statuses
                            .next()
                            .cloned()
                            .ok_or_else(|| missing("parameter_statuses"))?,
                    ),
                    PacketType::ReadyForQuery => BackendMessage::ReadyForQuery(
                        *ready_for_query.next().ok_or_else(|| missing("ready_for_query"))?,
                    ),
                    PacketType::RowDescription => BackendMessage::RowDescription(
                        row_descriptions.next().cloned().ok_or_else(|| missing("row_descriptions"))?,
                    ),
                    PacketType::BindComplete => BackendMessage::BindComplete,
                    PacketType::CloseComplete => BackendMessage::CloseComplete,
                    PacketType::EmptyQueryResponse => BackendMessage::EmptyQueryResponse,
                    PacketType::NoData => BackendMessage::NoData,
                    PacketType::ParseComplete => BackendMessage::ParseComplete,
                    PacketType::PortalSuspended => BackendMessage::PortalSuspended,
                };
                Ok(message)
            })
            .collect()
    }
}

/// Encode a structured response into the bytes a server would send.
///
/// # Errors
///
/// Returns [`EncodeError::EmptyPacketTypes`] for a response without packet
/// types, [`EncodeError::MissingField`] when a declared packet type has no
/// recorded value, or any error raised while encoding a message.
pub fn encode_response(response: &StructuredResponse) -> Result<Bytes, EncodeError> {
    if response.packet_types.is_empty() {
        return Err(EncodeError::EmptyPacketTypes);
    }
    let mut dst = BytesMut::new();
    for message in response.messages()? {
        message.encode(&mut dst)?;
    }
    Ok(dst.freeze())
}

/// Decode a server byte stream into its structured form.
///
/// # Errors
///
/// Returns a [`DecodeError`] if `src` is not a sequence of well-formed backend
/// messages.
pub fn decode_response(src: &[u8]) -> Result<StructuredResponse, DecodeError> {
    Ok(StructuredResponse::from_messages(decode_backend(src)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_one() -> StructuredResponse {
        StructuredResponse::from_messages([
            BackendMessage::RowDescription(vec![FieldDescription {
                name: "?column?".into(),
                table_oid: 0,
                column_attribute: 0,
                type_oid: 23,
                type_size: 4,
                type_modifier: -1,
                format: 0,
            }]),
            BackendMessage::DataRow(vec![Some(b"1".to_vec())]),
            BackendMessage::CommandComplete("SELECT 1".into()),
            BackendMessage::ReadyForQuery(TransactionStatus::Idle),
        ])
    }

    #[test]
    fn fields_are_grouped_by_kind() {
        let response = select_one();
        assert_eq!(
            response.packet_types,
            vec![
                PacketType::RowDescription,
                PacketType::DataRow,
                PacketType::CommandComplete,
                PacketType::ReadyForQuery,
            ]
        );
        assert_eq!(response.fields.data_rows, vec![vec![Some(b"1".to_vec())]]);
        assert_eq!(response.fields.ready_for_query, vec![TransactionStatus::Idle]);
    }

    #[test]
    fn encoded_response_decodes_to_same_structure() {
        let response = select_one();
        let bytes = encode_response(&response).expect("encode");
        assert_eq!(decode_response(&bytes).expect("decode"), response);
    }

    #[test]
    fn missing_field_names_type_and_position() {
        let mut response = select_one();
        response.packet_types.insert(2, PacketType::DataRow);
        assert_eq!(
            encode_response(&response).expect_err("second data row is not recorded"),
            EncodeError::MissingField {
                packet_type: PacketType::DataRow,
                field: "data_rows",
                position: 2,
            }
        );
    }

    #[test]
    fn empty_packet_types_cannot_be_encoded() {
        assert_eq!(
            encode_response(&StructuredResponse::default()).expect_err("nothing to encode"),
            EncodeError::EmptyPacketTypes
        );
    }

    #[test]
    fn field_free_packets_need_no_values() {
        let response = StructuredResponse {
            packet_types: vec![PacketType::ParseComplete, PacketType::BindComplete, PacketType::NoData],
            fields: ResponseFields::default(),
        };
        let bytes = encode_response(&response).expect("encode");
        assert_eq!(&bytes[..], &[b'1', 0, 0, 0, 4, b'2', 0, 0, 0, 4, b'n', 0, 0, 0, 4]);
    }
}
