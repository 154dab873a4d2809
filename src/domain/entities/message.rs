use crate::domain::value_objects::{MessageType, Partition, StreamId};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain Entity: NewMessage
///
/// What a caller supplies when appending to a stream. `stream_position`
/// and `global_position` are assigned by the event log during append, not
/// known to the caller in advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub message_type: MessageType,
    pub message_data: serde_json::Value,
    pub message_metadata: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn new(message_type: MessageType, message_data: serde_json::Value) -> Self {
        Self { message_type, message_data, message_metadata: None }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.message_metadata = Some(metadata);
        self
    }
}

/// Domain Entity: Message
///
/// A single durably-appended event. Immutable once constructed: no field
/// is ever updated after insert, matching the append-only contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    message_id: Uuid,
    stream_id: StreamId,
    partition: Partition,
    stream_position: u64,
    global_position: i64,
    message_type: MessageType,
    message_kind: String,
    message_schema_version: u32,
    message_data: serde_json::Value,
    message_metadata: Option<serde_json::Value>,
    is_archived: bool,
    created: DateTime<Utc>,
}

impl Message {
    /// Construct a just-appended message. `global_position` is assigned
    /// by the store (e.g. a `BIGSERIAL`) and passed in once known.
    pub fn new(
        stream_id: StreamId,
        partition: Partition,
        stream_position: u64,
        global_position: i64,
        message_type: MessageType,
        message_data: serde_json::Value,
        message_metadata: Option<serde_json::Value>,
    ) -> Result<Self> {
        if stream_position == 0 {
            return Err(CoreError::InvalidInput("stream_position must start at 1".to_string()));
        }
        Ok(Self {
            message_id: Uuid::new_v4(),
            stream_id,
            partition,
            stream_position,
            global_position,
            message_type,
            message_kind: "E".to_string(),
            message_schema_version: 1,
            message_data,
            message_metadata,
            is_archived: false,
            created: Utc::now(),
        })
    }

    /// Rebuild a message from a storage row, bypassing constructor
    /// invariants that only apply to freshly-minted messages.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        message_id: Uuid,
        stream_id: StreamId,
        partition: Partition,
        stream_position: u64,
        global_position: i64,
        message_type: MessageType,
        message_kind: String,
        message_schema_version: u32,
        message_data: serde_json::Value,
        message_metadata: Option<serde_json::Value>,
        is_archived: bool,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            stream_id,
            partition,
            stream_position,
            global_position,
            message_type,
            message_kind,
            message_schema_version,
            message_data,
            message_metadata,
            is_archived,
            created,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn global_position(&self) -> i64 {
        self.global_position
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn message_data(&self) -> &serde_json::Value {
        &self.message_data
    }

    pub fn message_metadata(&self) -> Option<&serde_json::Value> {
        self.message_metadata.as_ref()
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// The `enc` sub-object of `message_metadata`, if this message carries
    /// an envelope.
    pub fn envelope(&self) -> Option<&serde_json::Value> {
        self.message_metadata.as_ref().and_then(|m| m.get("enc"))
    }

    pub fn is_encrypted(&self) -> bool {
        self.envelope().is_some()
    }

    /// Return a copy of this message with `message_data`/`message_metadata`
    /// replaced, used by the crypto layer to swap in ciphertext on encrypt
    /// and plaintext on decrypt without otherwise mutating identity.
    pub fn with_data_and_metadata(
        &self,
        message_data: serde_json::Value,
        message_metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            message_data,
            message_metadata,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_id() -> StreamId {
        StreamId::new("order-1".to_string()).unwrap()
    }

    fn partition() -> Partition {
        Partition::new("acme".to_string()).unwrap()
    }

    #[test]
    fn constructs_valid_message() {
        let msg = Message::new(
            stream_id(),
            partition(),
            1,
            42,
            MessageType::new("order.placed".to_string()).unwrap(),
            json!({"sku": "SKU-1"}),
            None,
        )
        .unwrap();
        assert_eq!(msg.stream_position(), 1);
        assert_eq!(msg.global_position(), 42);
        assert!(!msg.is_encrypted());
    }

    #[test]
    fn rejects_zero_position() {
        let result = Message::new(
            stream_id(),
            partition(),
            0,
            1,
            MessageType::new("order.placed".to_string()).unwrap(),
            json!({}),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn detects_envelope_presence() {
        let metadata = json!({"enc": {"algo": "AES-GCM"}});
        let msg = Message::new(
            stream_id(),
            partition(),
            1,
            1,
            MessageType::new("order.placed".to_string()).unwrap(),
            json!({"ciphertext": "abc"}),
            Some(metadata),
        )
        .unwrap();
        assert!(msg.is_encrypted());
    }
}
