use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value Object: StreamId
///
/// Identifies a single stream within a partition (e.g. `order-482`,
/// `cart-f9a2`). Flexible format: any non-empty, non-whitespace string up
/// to 256 characters, matching how the original implementation treats
/// stream identifiers as opaque application-chosen strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(value: String) -> Result<Self> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn prefix(&self, delimiter: char) -> Option<&str> {
        self.0.split(delimiter).next().filter(|_| self.0.contains(delimiter))
    }

    fn validate(value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(CoreError::InvalidInput("stream id cannot be empty".to_string()));
        }
        if value.len() > 256 {
            return Err(CoreError::InvalidInput(format!(
                "stream id cannot exceed 256 characters, got {}",
                value.len()
            )));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(CoreError::InvalidInput("stream id cannot contain control characters".to_string()));
        }
        if value != value.trim() {
            return Err(CoreError::InvalidInput("stream id cannot have leading or trailing whitespace".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for StreamId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        StreamId::new(value.to_string())
    }
}

impl TryFrom<String> for StreamId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        StreamId::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_ids() {
        assert!(StreamId::new("order-482".to_string()).is_ok());
        assert!(StreamId::new("cart_f9a2".to_string()).is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace_only() {
        assert!(StreamId::new(String::new()).is_err());
        assert!(StreamId::new("   ".to_string()).is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(StreamId::new("order\n482".to_string()).is_err());
    }

    #[test]
    fn prefix_extraction() {
        let id = StreamId::new("order-482".to_string()).unwrap();
        assert_eq!(id.prefix('-'), Some("order"));
        let id = StreamId::new("simple".to_string()).unwrap();
        assert_eq!(id.prefix('-'), None);
    }
}
