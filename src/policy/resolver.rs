/// Policy Resolver (§4.4): decides whether and how to encrypt a given
/// append, failing closed when no policy is configured.
///
/// Grounded on the teacher's `SchemaRegistry` (`schema.rs`): a single
/// keyed lookup gating a downstream operation, generalized from schema
/// validation to encryption policy and narrowed to the two outcomes the
/// crypto store needs (a resolved policy, or a reason it can't proceed).
use std::sync::Arc;

use crate::domain::repositories::PolicyStore;
use crate::domain::value_objects::Partition;
use crate::error::{CoreError, Result};

/// What a caller does for one event, once a policy has been found.
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    pub algorithm: crate::crypto::Algorithm,
    pub key_ref: String,
}

pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Resolve the policy for `(partition, stream_type)`, deriving
    /// `key_ref` from the policy's scope. Fails closed with
    /// `PolicyResolutionFailed` when no policy is configured — callers on
    /// the append path must treat this as fatal; the read path only
    /// reaches this when an `enc` envelope is already present, so a
    /// resolution failure there just means the event is skipped, not
    /// silently downgraded to plaintext.
    pub async fn resolve(
        &self,
        partition: &Partition,
        stream_id: Option<&str>,
        stream_type: &str,
    ) -> Result<ResolvedPolicy> {
        let policy = self
            .store
            .find(partition, stream_type)
            .await?
            .ok_or_else(|| CoreError::PolicyResolutionFailed(format!(
                "no encryption policy for partition={} stream_type={}",
                partition, stream_type
            )))?;

        let key_ref = policy.key_scope().key_ref(stream_id, Some(stream_type))?;

        Ok(ResolvedPolicy { algorithm: policy.encryption_algorithm(), key_ref })
    }
}
