use crate::domain::value_objects::{Partition, StreamId};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The optimistic-concurrency constraint a caller attaches to an append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// No constraint: append regardless of current position.
    Any,
    /// The stream's current position must equal this value.
    Exact(u64),
    /// The stream must already exist (position may be anything).
    StreamExists,
    /// The stream must not exist yet.
    StreamDoesNotExist,
}

/// Checks `expected` against a stream's current position, where `None`
/// means the stream row does not exist at all.
///
/// Grounded on the teacher's `EventStream::append_event` optimistic-lock
/// check, generalized to the four-way constraint spec.md's
/// `appendToStream` accepts instead of a single expected-version integer.
pub fn validate_expected_version(current: Option<u64>, expected: &ExpectedVersion) -> Result<()> {
    match (expected, current) {
        (ExpectedVersion::Any, _) => Ok(()),
        (ExpectedVersion::StreamDoesNotExist, None) => Ok(()),
        (ExpectedVersion::StreamDoesNotExist, Some(actual)) => Err(CoreError::VersionMismatch {
            expected: "STREAM_DOES_NOT_EXIST".to_string(),
            actual: Some(actual),
        }),
        (ExpectedVersion::StreamExists, None) => Err(CoreError::VersionMismatch {
            expected: "STREAM_EXISTS".to_string(),
            actual: None,
        }),
        (ExpectedVersion::StreamExists, Some(_)) => Ok(()),
        (ExpectedVersion::Exact(v), Some(actual)) if *v == actual => Ok(()),
        (ExpectedVersion::Exact(v), actual) => Err(CoreError::VersionMismatch {
            expected: v.to_string(),
            actual,
        }),
    }
}

/// Domain Entity: Stream
///
/// Metadata row for one `(stream_id, partition)`. Holds only the
/// position watermark the event log needs to serialize appends; the
/// messages themselves live in the event log, not on this entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    stream_id: StreamId,
    partition: Partition,
    stream_type: String,
    stream_position: u64,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Stream {
    pub fn new(stream_id: StreamId, partition: Partition, stream_type: String) -> Self {
        let now = Utc::now();
        Self {
            stream_id,
            partition,
            stream_type,
            stream_position: 0,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn reconstruct(
        stream_id: StreamId,
        partition: Partition,
        stream_type: String,
        stream_position: u64,
        is_archived: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stream_id,
            partition,
            stream_type,
            stream_position,
            is_archived,
            created_at,
            updated_at,
        }
    }

    /// Reserve `count` contiguous positions starting right after the
    /// current position, returning the base position (the position of
    /// the stream before this batch). Positions `base+1 ..= base+count`
    /// belong to the newly-appended messages.
    pub fn reserve_positions(&mut self, count: u64) -> u64 {
        let base = self.stream_position;
        self.stream_position += count;
        self.updated_at = Utc::now();
        base
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
