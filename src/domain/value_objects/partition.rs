use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value Object: Partition
///
/// A partition is the tenant isolation key: every stream, message,
/// encryption key and policy is scoped to exactly one partition, and no
/// operation may read or write across partitions.
///
/// Domain Rules:
/// - Cannot be empty
/// - Must be 1-128 characters
/// - Cannot contain `::`, since key ids are built as
///   `{partition}::{key_ref}@{version}` and an embedded separator would
///   make that grammar ambiguous to parse back apart
/// - Immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Partition(String);

impl Partition {
    pub fn new(value: String) -> Result<Self> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// Construct without validation, for data already known to be valid
    /// (e.g. rows read back from storage).
    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    fn validate(value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(CoreError::InvalidInput("partition cannot be empty".to_string()));
        }
        if value.len() > 128 {
            return Err(CoreError::InvalidInput(format!(
                "partition cannot exceed 128 characters, got {}",
                value.len()
            )));
        }
        if value.contains("::") {
            return Err(CoreError::InvalidInput(
                "partition cannot contain '::' (reserved as the key id separator)".to_string(),
            ));
        }
        if value != value.trim() {
            return Err(CoreError::InvalidInput(
                "partition cannot have leading or trailing whitespace".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Partition {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        Partition::new(value.to_string())
    }
}

impl TryFrom<String> for Partition {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Partition::new(value)
    }
}
