use crate::crypto::Algorithm;
use crate::domain::value_objects::Partition;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// The granularity at which one key serves many streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScope {
    Stream,
    Type,
    Partition,
}

impl KeyScope {
    /// Derive the key manager's `key_ref` for this scope, given the
    /// append/read context. Mirrors §4.3's key ref derivation table.
    pub fn key_ref(&self, stream_id: Option<&str>, stream_type: Option<&str>) -> Result<String> {
        match self {
            KeyScope::Stream => stream_id
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .ok_or_else(|| CoreError::PolicyResolutionFailed("stream-scoped policy requires a stream_id".to_string())),
            KeyScope::Type => stream_type
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .ok_or_else(|| CoreError::PolicyResolutionFailed("type-scoped policy requires a stream_type".to_string())),
            KeyScope::Partition => Ok("default".to_string()),
        }
    }
}

/// Domain Entity: EncryptionPolicy
///
/// Governs whether and how messages of a given `stream_type` are
/// encrypted within one partition. At most one policy exists per
/// `(partition, stream_type_class)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionPolicy {
    policy_id: String,
    partition: Partition,
    stream_type_class: String,
    key_scope: KeyScope,
    encryption_algorithm: Algorithm,
    key_rotation_interval_days: Option<u32>,
}

impl EncryptionPolicy {
    pub fn new(
        policy_id: String,
        partition: Partition,
        stream_type_class: String,
        key_scope: KeyScope,
        encryption_algorithm: Algorithm,
        key_rotation_interval_days: Option<u32>,
    ) -> Self {
        Self {
            policy_id,
            partition,
            stream_type_class,
            key_scope,
            encryption_algorithm,
            key_rotation_interval_days,
        }
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn stream_type_class(&self) -> &str {
        &self.stream_type_class
    }

    pub fn key_scope(&self) -> KeyScope {
        self.key_scope
    }

    pub fn encryption_algorithm(&self) -> Algorithm {
        self.encryption_algorithm
    }

    pub fn key_rotation_interval_days(&self) -> Option<u32> {
        self.key_rotation_interval_days
    }
}
