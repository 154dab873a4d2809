use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value Object: MessageType
///
/// The application-defined discriminator carried by every message
/// (`order.placed`, `cart.item_added`, ...). The substrate treats this as
/// an opaque string for dispatch purposes; it does not attach semantics
/// to the value beyond non-emptiness and length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
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

    /// Everything before the first dot, if any (by convention the
    /// producer's namespace, e.g. `order` in `order.placed`).
    pub fn namespace(&self) -> Option<&str> {
        self.0.split('.').next().filter(|_| self.0.contains('.'))
    }

    fn validate(value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(CoreError::InvalidInput("message type cannot be empty".to_string()));
        }
        if value.len() > 128 {
            return Err(CoreError::InvalidInput(format!(
                "message type cannot exceed 128 characters, got {}",
                value.len()
            )));
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(CoreError::InvalidInput("message type cannot contain control characters".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for MessageType {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self> {
        MessageType::new(value.to_string())
    }
}

impl TryFrom<String> for MessageType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        MessageType::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_names() {
        assert!(MessageType::new("order.placed".to_string()).is_ok());
    }

    #[test]
    fn namespace_extraction() {
        let t = MessageType::new("order.placed".to_string()).unwrap();
        assert_eq!(t.namespace(), Some("order"));
        let t = MessageType::new("simple".to_string()).unwrap();
        assert_eq!(t.namespace(), None);
    }

    #[test]
    fn rejects_empty() {
        assert!(MessageType::new(String::new()).is_err());
    }
}
