/// In-memory event log.
///
/// Grounded on the teacher's `InMemoryEventStreamRepository`: a
/// `parking_lot::RwLock`-guarded map keyed by stream identity, suitable
/// for development, tests, and single-node deployments. Generalized from
/// the teacher's single `HashMap<String, EventStream>` to a
/// `(partition, stream_id)` key and a separate append-only message log
/// per stream, and from the teacher's `EventStream::append_event`
/// in-object optimistic lock to the free `validate_expected_version`
/// function shared with the Postgres implementation.
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::domain::entities::{validate_expected_version, ExpectedVersion, Message, NewMessage, Stream};
use crate::domain::repositories::{AppendResult, EventLog, ReadStreamOptions, ReadStreamResult, SessionCallback};
use crate::domain::value_objects::{Partition, StreamId};
use crate::error::{CoreError, Result};

struct StreamEntry {
    stream: Stream,
    messages: Vec<Message>,
}

/// Thread-safe, process-local `EventLog`. No poisoning on panic
/// (`parking_lot`), multiple readers / single writer per stream map.
pub struct InMemoryEventLog {
    streams: Arc<RwLock<HashMap<(String, String), StreamEntry>>>,
    global_position: Arc<AtomicI64>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            global_position: Arc::new(AtomicI64::new(0)),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) {
        self.streams.write().clear();
        self.global_position.store(0, Ordering::SeqCst);
    }

    fn key(partition: &Partition, stream_id: &StreamId) -> (String, String) {
        (partition.as_str().to_string(), stream_id.as_str().to_string())
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

type StreamMap = HashMap<(String, String), StreamEntry>;

fn do_append(
    streams: &RwLock<StreamMap>,
    global_position: &AtomicI64,
    stream_id: &StreamId,
    partition: &Partition,
    stream_type: &str,
    expected_version: ExpectedVersion,
    messages: Vec<NewMessage>,
) -> Result<AppendResult> {
    if messages.is_empty() {
        return Err(CoreError::EmptyBatch);
    }

    let key = InMemoryEventLog::key(partition, stream_id);
    let mut streams = streams.write();

    let current_position = streams.get(&key).map(|e| e.stream.stream_position());
    validate_expected_version(current_position, &expected_version)?;

    let created_new_stream = !streams.contains_key(&key);
    let entry = streams.entry(key).or_insert_with(|| StreamEntry {
        stream: Stream::new(stream_id.clone(), partition.clone(), stream_type.to_string()),
        messages: Vec::new(),
    });

    let base_position = entry.stream.reserve_positions(messages.len() as u64);
    let mut last_global_position = 0;
    for (i, msg) in messages.into_iter().enumerate() {
        let position = base_position + (i as u64) + 1;
        let global_position = global_position.fetch_add(1, Ordering::SeqCst) + 1;
        let message = Message::new(
            stream_id.clone(),
            partition.clone(),
            position,
            global_position,
            msg.message_type,
            msg.message_data,
            msg.message_metadata,
        )?;
        last_global_position = global_position;
        entry.messages.push(message);
    }

    Ok(AppendResult {
        next_version: entry.stream.stream_position(),
        last_global_position,
        created_new_stream,
    })
}

fn do_read(streams: &RwLock<StreamMap>, stream_id: &StreamId, partition: &Partition, options: ReadStreamOptions) -> Result<ReadStreamResult> {
    let key = InMemoryEventLog::key(partition, stream_id);
    let streams = streams.read();

    let Some(entry) = streams.get(&key) else {
        return Ok(ReadStreamResult { messages: Vec::new(), current_version: 0, stream_exists: false });
    };

    let from = options.from.unwrap_or(1);
    let to = options.to.unwrap_or(u64::MAX);
    let limit = options.max_count.unwrap_or(u64::MAX) as usize;

    let messages: Vec<Message> = entry
        .messages
        .iter()
        .filter(|m| m.stream_position() >= from && m.stream_position() < to)
        .take(limit)
        .cloned()
        .collect();

    Ok(ReadStreamResult {
        messages,
        current_version: entry.stream.stream_position(),
        stream_exists: true,
    })
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        stream_type: &str,
        expected_version: ExpectedVersion,
        messages: Vec<NewMessage>,
    ) -> Result<AppendResult> {
        do_append(&self.streams, &self.global_position, stream_id, partition, stream_type, expected_version, messages)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        options: ReadStreamOptions,
    ) -> Result<ReadStreamResult> {
        do_read(&self.streams, stream_id, partition, options)
    }

    async fn with_session<'a>(&'a self, callback: SessionCallback<'a>) -> Result<()> {
        // All operations already go through a single lock per call, so
        // there is no separate transaction object to thread through —
        // the session log is just this log, reused as-is (sharing the
        // same `Arc`-backed storage). Unlike the Postgres implementation
        // there is no partial-rollback: a failed callback leaves whatever
        // writes it already made in place.
        let session: Arc<dyn EventLog> = Arc::new(InMemorySessionEventLog {
            streams: self.streams.clone(),
            global_position: self.global_position.clone(),
        });
        callback(session).boxed().await
    }
}

struct InMemorySessionEventLog {
    streams: Arc<RwLock<StreamMap>>,
    global_position: Arc<AtomicI64>,
}

#[async_trait]
impl EventLog for InMemorySessionEventLog {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        stream_type: &str,
        expected_version: ExpectedVersion,
        messages: Vec<NewMessage>,
    ) -> Result<AppendResult> {
        do_append(&self.streams, &self.global_position, stream_id, partition, stream_type, expected_version, messages)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        options: ReadStreamOptions,
    ) -> Result<ReadStreamResult> {
        do_read(&self.streams, stream_id, partition, options)
    }

    async fn with_session<'b>(&'b self, callback: SessionCallback<'b>) -> Result<()> {
        let session: Arc<dyn EventLog> = Arc::new(InMemorySessionEventLog {
            streams: self.streams.clone(),
            global_position: self.global_position.clone(),
        });
        callback(session).boxed().await
    }
}
