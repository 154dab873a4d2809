use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::entities::EncryptionPolicy;
use crate::domain::repositories::PolicyStore;
use crate::domain::value_objects::Partition;
use crate::error::Result;

#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<(String, String), EncryptionPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self { policies: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn find(&self, partition: &Partition, stream_type_class: &str) -> Result<Option<EncryptionPolicy>> {
        let key = (partition.as_str().to_string(), stream_type_class.to_string());
        Ok(self.policies.read().get(&key).cloned())
    }

    async fn upsert(&self, policy: &EncryptionPolicy) -> Result<()> {
        let key = (policy.partition().as_str().to_string(), policy.stream_type_class().to_string());
        self.policies.write().insert(key, policy.clone());
        Ok(())
    }

    async fn list(&self, partition: &Partition) -> Result<Vec<EncryptionPolicy>> {
        Ok(self
            .policies
            .read()
            .values()
            .filter(|p| p.partition() == partition)
            .cloned()
            .collect())
    }
}
