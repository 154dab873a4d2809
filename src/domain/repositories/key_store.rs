use async_trait::async_trait;

use crate::domain::entities::EncryptionKey;
use crate::domain::value_objects::{KeyId, Partition};
use crate::error::Result;

/// Storage adapter for encryption keys. Grounded on the teacher's
/// `KmsClient` trait (`security/kms.rs`: create/get/list/rotate/disable
/// key), narrowed to the persistence operations the Key Manager (§4.3)
/// needs — active-key lookup by prefix, exact lookup by id, insert, bulk
/// retire/destroy — with the key-generation and rotation *policy* itself
/// living in `keys::KeyManager`, not here.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The highest-versioned active, non-destroyed key whose id starts
    /// with `{partition}::{key_ref}@`.
    async fn find_active(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>>;

    /// The highest-versioned key for `(partition, key_ref)` regardless of
    /// active/retired/destroyed status. Rows are never deleted, so after a
    /// shred this is how the key manager picks the next version instead
    /// of colliding with a tombstoned `@1` row.
    async fn find_latest(&self, partition: &Partition, key_ref: &str) -> Result<Option<EncryptionKey>>;

    /// Exact lookup by id, returning a destroyed/retired key too (the
    /// caller distinguishes those cases itself).
    async fn find_by_id(&self, partition: &Partition, key_id: &KeyId) -> Result<Option<EncryptionKey>>;

    /// Insert a freshly-generated key. Must surface a distinguishable
    /// conflict error so `KeyManager::get_active_key` can treat a losing
    /// racer by re-reading rather than failing the caller.
    async fn insert(&self, key: &EncryptionKey) -> Result<()>;

    /// Persist `retire()`/`destroy()` state transitions already applied
    /// to the in-memory entity.
    async fn update(&self, key: &EncryptionKey) -> Result<()>;

    /// Retire every active key for `(partition, key_ref)`, as the first
    /// half of a rotation.
    async fn retire_all(&self, partition: &Partition, key_ref: &str) -> Result<()>;

    /// Destroy every non-destroyed key in the partition. Irreversible;
    /// never deletes rows.
    async fn destroy_partition(&self, partition: &Partition) -> Result<()>;
}
