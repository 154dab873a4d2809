use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value Object: KeyId
///
/// Canonical identifier for one version of one encryption key:
/// `{partition}::{key_ref}@{version}`. `partition` must not contain `::`
/// (enforced by `Partition` itself) and `key_ref` must not contain `@`,
/// since both characters are the grammar's own separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId {
    partition: String,
    key_ref: String,
    version: u32,
}

impl KeyId {
    pub fn new(partition: impl Into<String>, key_ref: impl Into<String>, version: u32) -> Result<Self> {
        let partition = partition.into();
        let key_ref = key_ref.into();
        Self::validate(&partition, &key_ref)?;
        Ok(Self { partition, key_ref, version })
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn key_ref(&self) -> &str {
        &self.key_ref
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Prefix matching the active-key lookup in the spec's key manager
    /// algorithm: `{partition}::{key_ref}@`.
    pub fn prefix(partition: &str, key_ref: &str) -> String {
        format!("{}::{}@", partition, key_ref)
    }

    fn validate(partition: &str, key_ref: &str) -> Result<()> {
        if partition.is_empty() || key_ref.is_empty() {
            return Err(CoreError::InvalidInput("key id partition and key_ref cannot be empty".to_string()));
        }
        if partition.contains("::") {
            return Err(CoreError::InvalidInput("key id partition cannot contain '::'".to_string()));
        }
        if key_ref.contains('@') {
            return Err(CoreError::InvalidInput("key id key_ref cannot contain '@'".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}@{}", self.partition, self.key_ref, self.version)
    }
}

impl TryFrom<&str> for KeyId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        let (partition, rest) = value
            .split_once("::")
            .ok_or_else(|| CoreError::InvalidDataFormat(format!("malformed key id: {}", value)))?;
        let (key_ref, version) = rest
            .rsplit_once('@')
            .ok_or_else(|| CoreError::InvalidDataFormat(format!("malformed key id: {}", value)))?;
        let version: u32 = version
            .parse()
            .map_err(|_| CoreError::InvalidDataFormat(format!("malformed key id version: {}", value)))?;
        KeyId::new(partition, key_ref, version)
    }
}

impl TryFrom<String> for KeyId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        KeyId::try_from(value.as_str())
    }
}

impl From<KeyId> for String {
    fn from(value: KeyId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_canonical_form() {
        let id = KeyId::new("acme", "cart", 3).unwrap();
        assert_eq!(id.to_string(), "acme::cart@3");
    }

    #[test]
    fn roundtrips_through_string() {
        let id = KeyId::new("acme", "cart", 3).unwrap();
        let parsed = KeyId::try_from(id.to_string().as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_key_ref_with_at_sign() {
        assert!(KeyId::new("acme", "cart@bad", 1).is_err());
    }

    #[test]
    fn prefix_matches_active_key_lookup() {
        assert_eq!(KeyId::prefix("acme", "cart"), "acme::cart@");
        let id = KeyId::new("acme", "cart", 7).unwrap();
        assert!(id.to_string().starts_with(&KeyId::prefix("acme", "cart")));
    }

    #[test]
    fn rejects_malformed_string() {
        assert!(KeyId::try_from("no-separator").is_err());
        assert!(KeyId::try_from("acme::cart-no-version").is_err());
    }
}
