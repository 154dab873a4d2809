use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::entities::EncryptionKey;
use crate::domain::repositories::KeyStore;
use crate::domain::value_objects::{KeyId, Partition};
use crate::error::{CoreError, Result};

/// In-memory `KeyStore`, grounded on the teacher's `LocalKms`
/// (`RwLock<HashMap<..>>` over key metadata). Keyed by the full `KeyId`
/// string so lookups mirror the Postgres primary key exactly.
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<String, EncryptionKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self { keys: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn find_active(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>> {
        let prefix = KeyId::prefix(partition.as_str(), key_ref);
        let keys = self.keys.read();
        Ok(keys
            .values()
            .filter(|k| k.key_id().to_string().starts_with(&prefix) && k.is_active() && !k.is_destroyed())
            .max_by_key(|k| k.key_version())
            .cloned())
    }

    async fn find_latest(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>> {
        let prefix = KeyId::prefix(partition.as_str(), key_ref);
        let keys = self.keys.read();
        Ok(keys
            .values()
            .filter(|k| k.key_id().to_string().starts_with(&prefix))
            .max_by_key(|k| k.key_version())
            .cloned())
    }

    async fn find_by_id(&self, _partition: &Partition, key_id: &KeyId) -> Result<Option<EncryptionKey>> {
        Ok(self.keys.read().get(&key_id.to_string()).cloned())
    }

    async fn insert(&self, key: &EncryptionKey) -> Result<()> {
        let id = key.key_id().to_string();
        let mut keys = self.keys.write();
        if keys.contains_key(&id) {
            return Err(CoreError::KeyManagementFailed(format!("key {} already exists", id)));
        }
        keys.insert(id, key.clone());
        Ok(())
    }

    async fn update(&self, key: &EncryptionKey) -> Result<()> {
        self.keys.write().insert(key.key_id().to_string(), key.clone());
        Ok(())
    }

    async fn retire_all(&self, partition: &Partition, key_ref: &str) -> Result<()> {
        let prefix = KeyId::prefix(partition.as_str(), key_ref);
        let mut keys = self.keys.write();
        for key in keys.values_mut() {
            if key.key_id().to_string().starts_with(&prefix) && key.is_active() {
                key.retire();
            }
        }
        Ok(())
    }

    async fn destroy_partition(&self, partition: &Partition) -> Result<()> {
        let prefix = format!("{}::", partition.as_str());
        let mut keys = self.keys.write();
        for key in keys.values_mut() {
            if key.key_id().to_string().starts_with(&prefix) && !key.is_destroyed() {
                key.destroy();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::KeyMaterial;

    fn partition() -> Partition {
        Partition::new("acme".to_string()).unwrap()
    }

    #[tokio::test]
    async fn destroy_partition_is_scoped() {
        let store = InMemoryKeyStore::new();
        let key_a = EncryptionKey::new_active(KeyId::new("acme", "cart", 1).unwrap(), KeyMaterial::new(vec![0u8; 24]));
        let key_b = EncryptionKey::new_active(KeyId::new("other", "cart", 1).unwrap(), KeyMaterial::new(vec![0u8; 24]));
        store.insert(&key_a).await.unwrap();
        store.insert(&key_b).await.unwrap();

        store.destroy_partition(&partition()).await.unwrap();

        assert!(store.find_by_id(&partition(), key_a.key_id()).await.unwrap().unwrap().is_destroyed());
        assert!(!store
            .find_by_id(&Partition::new("other".to_string()).unwrap(), key_b.key_id())
            .await
            .unwrap()
            .unwrap()
            .is_destroyed());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let store = InMemoryKeyStore::new();
        let key = EncryptionKey::new_active(KeyId::new("acme", "cart", 1).unwrap(), KeyMaterial::new(vec![0u8; 24]));
        store.insert(&key).await.unwrap();
        assert!(store.insert(&key).await.is_err());
    }
}
