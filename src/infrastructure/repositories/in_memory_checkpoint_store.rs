use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::entities::Checkpoint;
use crate::domain::repositories::CheckpointStore;
use crate::domain::value_objects::{Partition, StreamId};
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<(String, String, String), Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self { checkpoints: RwLock::new(HashMap::new()) }
    }

    fn key(subscription_id: &str, partition: &Partition, stream_id: &StreamId) -> (String, String, String) {
        (subscription_id.to_string(), partition.as_str().to_string(), stream_id.as_str().to_string())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn find(&self, subscription_id: &str, partition: &Partition, stream_id: &StreamId) -> Result<Option<Checkpoint>> {
        let key = Self::key(subscription_id, partition, stream_id);
        Ok(self.checkpoints.read().get(&key).cloned())
    }

    async fn create(&self, checkpoint: &Checkpoint) -> Result<()> {
        let key = Self::key(checkpoint.subscription_id(), checkpoint.partition(), checkpoint.stream_id());
        self.checkpoints.write().entry(key).or_insert_with(|| checkpoint.clone());
        Ok(())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let key = Self::key(checkpoint.subscription_id(), checkpoint.partition(), checkpoint.stream_id());
        self.checkpoints.write().insert(key, checkpoint.clone());
        Ok(())
    }
}
