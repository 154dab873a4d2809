/// Consumer (§4.7): a long-lived poller that repeatedly drives the
/// Runner's per-event algorithm across every stream of a partition,
/// tolerating individual handler failures instead of aborting the batch.
///
/// No direct teacher analogue; grounded on the same
/// checkpoint-read/bounded-read shape as `ProjectionRunner`, diverging
/// from it exactly where §4.7 says to: tolerant dispatch instead of
/// strict, and a checkpoint that only advances once something actually
/// ran.
use std::sync::Arc;
use std::time::Duration;

use crate::domain::entities::Checkpoint;
use crate::domain::repositories::{CheckpointStore, EventLog, ReadStreamOptions};
use crate::domain::value_objects::{Partition, StreamId};
use crate::error::Result;
use crate::projection::runner::HandlerRegistry;

/// Outcome of one poll of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    pub processed: u64,
}

pub struct Consumer {
    log: Arc<dyn EventLog>,
    checkpoints: Arc<dyn CheckpointStore>,
    subscription_id: String,
    batch_size: u64,
    poll_interval: Duration,
}

impl Consumer {
    pub fn new(
        log: Arc<dyn EventLog>,
        checkpoints: Arc<dyn CheckpointStore>,
        subscription_id: impl Into<String>,
        batch_size: u64,
        poll_interval: Duration,
    ) -> Self {
        Self { log, checkpoints, subscription_id: subscription_id.into(), batch_size, poll_interval }
    }

    async fn checkpoint(&self, partition: &Partition, stream_id: &StreamId) -> Result<Checkpoint> {
        if let Some(checkpoint) = self.checkpoints.find(&self.subscription_id, partition, stream_id).await? {
            return Ok(checkpoint);
        }
        let fresh = Checkpoint::new(self.subscription_id.clone(), partition.clone(), stream_id.clone());
        self.checkpoints.create(&fresh).await?;
        Ok(fresh)
    }

    /// Poll one stream once: read a bounded batch past the consumer's own
    /// checkpoint row and tolerantly dispatch each event. A handler
    /// exception is logged (inside `HandlerRegistry::dispatch_tolerant`)
    /// and does not stop the batch. Per §9, the checkpoint advances past
    /// an event only when at least one handler ran for it — an event
    /// whose type matches no handler and no all-events fallback leaves
    /// the checkpoint where it was, so a caller that wants pure
    /// audit-log progress should register at least a no-op catch-all.
    pub async fn poll_stream(&self, partition: &Partition, stream_id: &StreamId, handlers: &HandlerRegistry) -> Result<PollResult> {
        let mut checkpoint = self.checkpoint(partition, stream_id).await?;
        let from = checkpoint.last_processed_position() + 1;

        let result = self
            .log
            .read_stream(
                stream_id,
                partition,
                ReadStreamOptions { from: Some(from), to: Some(from + self.batch_size), max_count: Some(self.batch_size) },
            )
            .await?;

        let mut processed = 0u64;
        for event in &result.messages {
            let ran = handlers.dispatch_tolerant(event).await;
            if ran > 0 {
                checkpoint.advance_to(event.stream_position())?;
                self.checkpoints.save(&checkpoint).await?;
                processed += 1;
            } else {
                tracing::warn!(stream_id = %stream_id, position = event.stream_position(), "no handler ran for event; checkpoint not advanced");
            }
        }

        Ok(PollResult { processed })
    }

    /// Poll every stream in `stream_ids` once. Errors on one stream are
    /// logged and do not stop the others — the consumer is long-lived and
    /// a transient failure on one stream should not starve the rest of
    /// the partition.
    pub async fn poll_once(&self, partition: &Partition, stream_ids: &[StreamId], handlers: &HandlerRegistry) -> Vec<PollResult> {
        let mut results = Vec::with_capacity(stream_ids.len());
        for stream_id in stream_ids {
            match self.poll_stream(partition, stream_id, handlers).await {
                Ok(r) => results.push(r),
                Err(e) => {
                    tracing::error!(error = %e, stream_id = %stream_id, "poll failed for stream; continuing with the rest of the partition");
                    results.push(PollResult { processed: 0 });
                }
            }
        }
        results
    }

    /// Run forever, polling `stream_ids()` at the configured interval.
    /// `stream_ids` is re-invoked on every tick so newly-created streams
    /// are picked up without restarting the consumer.
    pub async fn run<F>(&self, partition: Partition, handlers: HandlerRegistry, stream_ids: F) -> !
    where
        F: Fn() -> Vec<StreamId>,
    {
        loop {
            let ids = stream_ids();
            self.poll_once(&partition, &ids, &handlers).await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ExpectedVersion, Message, NewMessage};
    use crate::domain::value_objects::MessageType;
    use crate::infrastructure::repositories::{InMemoryCheckpointStore, InMemoryEventLog};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn partition() -> Partition {
        Partition::new("acme".to_string()).unwrap()
    }

    fn consumer(log: Arc<InMemoryEventLog>, checkpoints: Arc<InMemoryCheckpointStore>) -> Consumer {
        Consumer::new(log, checkpoints, "consumer-1", 10, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn continues_after_handler_failure() {
        let log = Arc::new(InMemoryEventLog::new());
        let stream_id = StreamId::new("order-1".to_string()).unwrap();
        log.append_to_stream(
            &stream_id,
            &partition(),
            "order",
            ExpectedVersion::Any,
            vec![
                NewMessage::new(MessageType::new("order.placed".to_string()).unwrap(), json!({"n": 1})),
                NewMessage::new(MessageType::new("order.placed".to_string()).unwrap(), json!({"n": 2})),
            ],
        )
        .await
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let mut handlers = HandlerRegistry::new();
        handlers.on(
            "order.placed",
            Arc::new(move |event: &Message| {
                let calls = calls_clone.clone();
                let n = event.message_data().get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        Err(crate::error::CoreError::InvalidInput("boom".to_string()))
                    } else {
                        Ok(())
                    }
                })
            }),
        );

        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let consumer = consumer(log, checkpoints.clone());
        let results = consumer.poll_once(&partition(), &[stream_id.clone()], &handlers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Event 1's only handler failed, so ran == 0 and its checkpoint
        // did not advance; event 2 ran successfully, advancing past it.
        assert_eq!(results[0].processed, 1);
        let checkpoint = checkpoints.find("consumer-1", &partition(), &stream_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.last_processed_position(), 2);
    }

    #[tokio::test]
    async fn events_with_no_matching_handler_do_not_advance_checkpoint() {
        let log = Arc::new(InMemoryEventLog::new());
        let stream_id = StreamId::new("order-1".to_string()).unwrap();
        log.append_to_stream(
            &stream_id,
            &partition(),
            "order",
            ExpectedVersion::Any,
            vec![NewMessage::new(MessageType::new("order.placed".to_string()).unwrap(), json!({}))],
        )
        .await
        .unwrap();

        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let consumer = consumer(log, checkpoints.clone());
        let handlers = HandlerRegistry::new();
        let results = consumer.poll_once(&partition(), &[stream_id.clone()], &handlers).await;

        assert_eq!(results[0].processed, 0);
        let checkpoint = checkpoints.find("consumer-1", &partition(), &stream_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.last_processed_position(), 0);
    }
}
