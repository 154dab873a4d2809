use async_trait::async_trait;

use crate::domain::entities::Checkpoint;
use crate::domain::value_objects::{Partition, StreamId};
use crate::error::Result;

/// Storage adapter for subscription checkpoints (the `subscriptions`
/// table). Grounded on the teacher's `EventStreamRepository::get_watermark`
/// read-then-advance shape, generalized from a per-stream watermark to a
/// per-(subscription, stream) checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch the checkpoint, or `None` if this subscription has never
    /// processed this stream before.
    async fn find(
        &self,
        subscription_id: &str,
        partition: &Partition,
        stream_id: &StreamId,
    ) -> Result<Option<Checkpoint>>;

    /// Insert a fresh checkpoint starting at position 0.
    async fn create(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Persist an advanced checkpoint. Callers are expected to call this
    /// inside the same transaction as the projection write it follows.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}
