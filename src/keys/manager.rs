/// Key Manager (§4.3): lazy creation, rotation, and partition-wide
/// shredding of symmetric key material.
///
/// Grounded on the teacher's `LocalKms`/`KmsManager` (`security/kms.rs`):
/// same "generate on first use, version on rotation" shape, generalized
/// from the teacher's in-process `HashMap` to an injected `KeyStore` so
/// the same policy works against Postgres or memory, and from the
/// teacher's boolean `KeyStatus` to the split `retired_at`/`destroyed_at`
/// fields `EncryptionKey` already carries.
use std::sync::Arc;

use crate::crypto::cipher;
use crate::domain::entities::{EncryptionKey, KeyMaterial};
use crate::domain::repositories::KeyStore;
use crate::domain::value_objects::{KeyId, Partition};
use crate::error::{CoreError, Result};

pub struct KeyManager {
    store: Arc<dyn KeyStore>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Return the active key for `(partition, key_ref)`, creating a
    /// fresh key if none exists. Racy across processes: if two callers
    /// both observe no active key and both try to insert the same next
    /// version, the loser's `insert` surfaces a conflict and this
    /// re-reads to return the winner rather than erroring.
    ///
    /// The new version is `highest existing version for this key_ref +
    /// 1` (falling back to 1 if no row exists at all), not a hardcoded
    /// version 1 — rows are never deleted, so after `destroy_partition`
    /// a literal "always create version 1" would collide with the
    /// tombstoned `@1` row already on disk.
    pub async fn get_active_key(&self, partition: &Partition, key_ref: &str) -> Result<EncryptionKey> {
        if let Some(key) = self.store.find_active(partition, key_ref).await? {
            return Ok(key);
        }

        let next_version = self
            .store
            .find_latest(partition, key_ref)
            .await?
            .map(|k| k.key_version() + 1)
            .unwrap_or(1);

        let key_id = KeyId::new(partition.as_str(), key_ref, next_version)?;
        let material = KeyMaterial::new(cipher::generate_key_material());
        let key = EncryptionKey::new_active(key_id, material);

        match self.store.insert(&key).await {
            Ok(()) => Ok(key),
            Err(_) => self
                .store
                .find_active(partition, key_ref)
                .await?
                .ok_or_else(|| CoreError::KeyManagementFailed(format!(
                    "lost the key-creation race for {}/{} but no winner is visible",
                    partition, key_ref
                ))),
        }
    }

    /// Exact lookup by key id, distinguishing "never existed"
    /// (`KeyNotFound`) from "destroyed" (`KeyDestroyed`) — rows are never
    /// deleted on shred, so this distinction stays answerable forever.
    /// Used by callers that want to log the specific reason a key is
    /// unavailable.
    pub async fn require_key_by_id(&self, partition: &Partition, key_id: &KeyId) -> Result<EncryptionKey> {
        let key = self
            .store
            .find_by_id(partition, key_id)
            .await?
            .ok_or_else(|| CoreError::KeyNotFound(key_id.to_string()))?;
        if key.is_destroyed() {
            return Err(CoreError::KeyDestroyed(key_id.to_string()));
        }
        Ok(key)
    }

    /// Exact lookup by key id, used on the decrypt path to resolve a
    /// specific historical version. `None` covers "never existed",
    /// "destroyed", and "tampered id" alike — the caller treats all three
    /// as "skip this event".
    pub async fn get_key_by_id(&self, partition: &Partition, key_id: &KeyId) -> Result<Option<EncryptionKey>> {
        match self.require_key_by_id(partition, key_id).await {
            Ok(key) => Ok(Some(key)),
            Err(CoreError::KeyNotFound(_)) | Err(CoreError::KeyDestroyed(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Rotate `(partition, key_ref)`: retire every prior version, then
    /// insert a fresh version at `current + 1`. Never more than one
    /// active version exists after this returns.
    pub async fn rotate_key(&self, partition: &Partition, key_ref: &str) -> Result<EncryptionKey> {
        let current_version = self
            .store
            .find_active(partition, key_ref)
            .await?
            .map(|k| k.key_version())
            .unwrap_or(0);

        self.store.retire_all(partition, key_ref).await?;

        let key_id = KeyId::new(partition.as_str(), key_ref, current_version + 1)?;
        let material = KeyMaterial::new(cipher::generate_key_material());
        let key = EncryptionKey::new_active(key_id, material);
        self.store.insert(&key).await?;
        Ok(key)
    }

    /// Irreversibly shred every non-destroyed key in `partition`.
    pub async fn destroy_partition_keys(&self, partition: &Partition) -> Result<()> {
        self.store.destroy_partition(partition).await
    }
}
