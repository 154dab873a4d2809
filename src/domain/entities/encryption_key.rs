use crate::domain::value_objects::KeyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Raw symmetric key bytes. Zeroed on drop; `Debug` never prints the
/// material. Borrowed by the crypto layer for a single encrypt/decrypt
/// call and never persisted beyond that call's scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyMaterial").field(&"<redacted>").finish()
    }
}

impl Serialize for KeyMaterial {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for KeyMaterial {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

/// Domain Entity: EncryptionKey
///
/// One versioned symmetric key. `retired_at` and `destroyed_at` are kept
/// distinct (see DESIGN.md's resolution of the active-flag/destroyed-at
/// open question): rotation sets `retired_at` and flips `is_active` off,
/// while `destroyPartitionKeys` sets `destroyed_at` and makes the key
/// permanently unavailable for decryption regardless of `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    key_id: KeyId,
    key_material: KeyMaterial,
    key_version: u32,
    is_active: bool,
    retired_at: Option<DateTime<Utc>>,
    destroyed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EncryptionKey {
    pub fn new_active(key_id: KeyId, key_material: KeyMaterial) -> Self {
        let now = Utc::now();
        let key_version = key_id.version();
        Self {
            key_id,
            key_material,
            key_version,
            is_active: true,
            retired_at: None,
            destroyed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        key_id: KeyId,
        key_material: KeyMaterial,
        key_version: u32,
        is_active: bool,
        retired_at: Option<DateTime<Utc>>,
        destroyed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key_id,
            key_material,
            key_version,
            is_active,
            retired_at,
            destroyed_at,
            created_at,
            updated_at,
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn key_material(&self) -> &KeyMaterial {
        &self.key_material
    }

    pub fn key_version(&self) -> u32 {
        self.key_version
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn destroyed_at(&self) -> Option<DateTime<Utc>> {
        self.destroyed_at
    }

    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.retired_at
    }

    /// A destroyed key is unusable for decryption regardless of its
    /// retired/active flags; a merely-retired (rotated-out) key remains
    /// usable to decrypt the historical events it was assigned to.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }

    pub fn retire(&mut self) {
        self.is_active = false;
        self.retired_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn destroy(&mut self) {
        self.destroyed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EncryptionKey {
        EncryptionKey::new_active(KeyId::new("acme", "cart", 1).unwrap(), KeyMaterial::new(vec![0u8; 24]))
    }

    #[test]
    fn new_key_is_active_and_not_destroyed() {
        let k = key();
        assert!(k.is_active());
        assert!(!k.is_destroyed());
    }

    #[test]
    fn retiring_does_not_destroy() {
        let mut k = key();
        k.retire();
        assert!(!k.is_active());
        assert!(k.retired_at().is_some());
        assert!(!k.is_destroyed());
    }

    #[test]
    fn destroying_sets_destroyed_regardless_of_active() {
        let mut k = key();
        k.destroy();
        assert!(k.is_destroyed());
    }

    #[test]
    fn key_material_debug_is_redacted() {
        let k = key();
        assert_eq!(format!("{:?}", k.key_material()), "KeyMaterial(\"<redacted>\")");
    }

    #[test]
    fn key_material_serde_roundtrips() {
        let m = KeyMaterial::new(vec![1, 2, 3, 4]);
        let json = serde_json::to_string(&m).unwrap();
        let back: KeyMaterial = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_bytes(), &[1, 2, 3, 4]);
    }
}
