use async_trait::async_trait;

use crate::domain::entities::EncryptionPolicy;
use crate::domain::value_objects::Partition;
use crate::error::Result;

/// Storage adapter for encryption policies. No direct teacher analogue;
/// modeled after the registry-lookup shape of the teacher's
/// `SchemaRegistry` (`schema.rs`): a single keyed lookup queried before
/// an operation proceeds, with `None` meaning fail-closed to the caller.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// At most one policy exists per `(partition, stream_type_class)`.
    async fn find(&self, partition: &Partition, stream_type_class: &str) -> Result<Option<EncryptionPolicy>>;

    async fn upsert(&self, policy: &EncryptionPolicy) -> Result<()>;

    async fn list(&self, partition: &Partition) -> Result<Vec<EncryptionPolicy>>;
}
