/// Envelope Crypto Store (§4.2): a decorator that wraps any
/// `EventLog`-shaped collaborator and transparently encrypts payloads on
/// append and decrypts them on read.
///
/// No direct teacher analogue for the decorator shape itself (the
/// teacher's `security/encryption.rs` calls AES-GCM inline rather than
/// wrapping a repository), but the encrypt/decrypt primitives it calls
/// into (`crypto::cipher`) are grounded on the teacher's
/// `security/kms.rs`/`security/encryption.rs` pair, and the
/// `with_session` recursive-wrap shape mirrors
/// `PostgresSessionEventLog::with_session` in
/// `infrastructure/repositories/postgres_event_log.rs`.
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::crypto::{aad::AadContext, build_aad, cipher, Algorithm};
use crate::domain::entities::{ExpectedVersion, Message, NewMessage};
use crate::domain::repositories::{AppendResult, EventLog, ReadStreamOptions, ReadStreamResult, SessionCallback};
use crate::domain::value_objects::{KeyId, Partition, StreamId};
use crate::error::{CoreError, Result};
use crate::keys::KeyManager;
use crate::policy::PolicyResolver;

pub struct EnvelopeEventLog {
    inner: Arc<dyn EventLog>,
    policies: Arc<PolicyResolver>,
    keys: Arc<KeyManager>,
}

impl EnvelopeEventLog {
    pub fn new(inner: Arc<dyn EventLog>, policies: Arc<PolicyResolver>, keys: Arc<KeyManager>) -> Self {
        Self { inner, policies, keys }
    }

    /// Encrypt-path steps 1-6. Fails closed: a missing policy or key
    /// error propagates to the caller and aborts the whole append.
    async fn encrypt_message(
        &self,
        partition: &Partition,
        stream_id: &StreamId,
        stream_type: &str,
        msg: NewMessage,
    ) -> Result<NewMessage> {
        let resolved = self.policies.resolve(partition, Some(stream_id.as_str()), stream_type).await?;
        let key = self.keys.get_active_key(partition, &resolved.key_ref).await?;

        let iv = cipher::generate_iv(resolved.algorithm);
        let ctx = AadContext { partition, stream_id, stream_type, event_type: &msg.message_type };
        let aad = build_aad(&ctx);
        let plaintext = serde_json::to_vec(&msg.message_data)?;
        let ciphertext = cipher::encrypt(resolved.algorithm, key.key_material().as_bytes(), &iv, &aad, &plaintext)?;

        let enc = json!({
            "algo": resolved.algorithm.as_str(),
            "key_id": key.key_id().to_string(),
            "key_version": key.key_version(),
            "iv": base64::engine::general_purpose::STANDARD.encode(&iv),
            "stream_type": stream_type,
            "event_type": msg.message_type.as_str(),
        });
        let mut metadata = msg.message_metadata.unwrap_or_else(|| json!({}));
        metadata
            .as_object_mut()
            .ok_or_else(|| CoreError::InvalidInput("message_metadata must be a JSON object".to_string()))?
            .insert("enc".to_string(), enc);

        Ok(NewMessage {
            message_type: msg.message_type,
            message_data: json!({ "ciphertext": base64::engine::general_purpose::STANDARD.encode(&ciphertext) }),
            message_metadata: Some(metadata),
        })
    }

    /// Decrypt-path steps 1-5. `None` means "skip this event" — a
    /// destroyed/missing key or a failed AEAD check, both logged rather
    /// than raised.
    async fn decrypt_message(&self, partition: &Partition, msg: Message) -> Option<Message> {
        let Some(enc) = msg.envelope() else {
            return Some(msg);
        };

        let parsed = (|| -> Result<(Algorithm, KeyId, Vec<u8>)> {
            let algo: Algorithm = enc
                .get("algo")
                .and_then(|v| v.as_str())
                .ok_or_else(|| CoreError::InvalidDataFormat("envelope missing algo".to_string()))?
                .parse()?;
            let key_id: KeyId = enc
                .get("key_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| CoreError::InvalidDataFormat("envelope missing key_id".to_string()))?
                .try_into()?;
            let iv = base64::engine::general_purpose::STANDARD
                .decode(
                    enc.get("iv")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| CoreError::InvalidDataFormat("envelope missing iv".to_string()))?,
                )
                .map_err(|e| CoreError::InvalidDataFormat(format!("malformed envelope iv: {}", e)))?;
            Ok((algo, key_id, iv))
        })();

        let (algo, key_id, iv) = match parsed {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, stream_id = %msg.stream_id(), "malformed envelope; skipping event");
                return None;
            }
        };

        let key = match self.keys.require_key_by_id(partition, &key_id).await {
            Ok(k) => k,
            Err(e @ (CoreError::KeyNotFound(_) | CoreError::KeyDestroyed(_))) => {
                tracing::info!(reason = %e, stream_id = %msg.stream_id(), "key unavailable for decryption; skipping event");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, %key_id, "key lookup failed; skipping event");
                return None;
            }
        };

        let ctx = AadContext {
            partition,
            stream_id: msg.stream_id(),
            stream_type: msg.message_metadata().and_then(|m| m.get("enc")).and_then(|e| e.get("stream_type")).and_then(|v| v.as_str()).unwrap_or(""),
            event_type: msg.message_type(),
        };
        let aad = build_aad(&ctx);

        let ciphertext = match msg.message_data().get("ciphertext").and_then(|v| v.as_str()) {
            Some(s) => match base64::engine::general_purpose::STANDARD.decode(s) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, stream_id = %msg.stream_id(), "malformed ciphertext; skipping event");
                    return None;
                }
            },
            None => {
                tracing::error!(stream_id = %msg.stream_id(), "envelope present but message_data has no ciphertext; skipping event");
                return None;
            }
        };

        let plaintext = match cipher::decrypt(algo, key.key_material().as_bytes(), &iv, &aad, &ciphertext) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, stream_id = %msg.stream_id(), "AEAD authentication failed; skipping event");
                return None;
            }
        };

        let data: serde_json::Value = match serde_json::from_slice(&plaintext) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, stream_id = %msg.stream_id(), "decrypted payload is not valid JSON; skipping event");
                return None;
            }
        };

        Some(msg.with_data_and_metadata(data, msg.message_metadata().cloned()))
    }
}

#[async_trait]
impl EventLog for EnvelopeEventLog {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        stream_type: &str,
        expected_version: ExpectedVersion,
        messages: Vec<NewMessage>,
    ) -> Result<AppendResult> {
        let mut encrypted = Vec::with_capacity(messages.len());
        for msg in messages {
            encrypted.push(self.encrypt_message(partition, stream_id, stream_type, msg).await?);
        }
        self.inner.append_to_stream(stream_id, partition, stream_type, expected_version, encrypted).await
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        partition: &Partition,
        options: ReadStreamOptions,
    ) -> Result<ReadStreamResult> {
        let result = self.inner.read_stream(stream_id, partition, options).await?;
        let mut decrypted = Vec::with_capacity(result.messages.len());
        for msg in result.messages {
            if let Some(msg) = self.decrypt_message(partition, msg).await {
                decrypted.push(msg);
            }
        }
        Ok(ReadStreamResult { messages: decrypted, current_version: result.current_version, stream_exists: result.stream_exists })
    }

    async fn with_session<'a>(&'a self, callback: SessionCallback<'a>) -> Result<()> {
        let policies = self.policies.clone();
        let keys = self.keys.clone();
        self.inner
            .with_session(Box::new(move |session_log: Arc<dyn EventLog>| {
                let wrapped: Arc<dyn EventLog> = Arc::new(EnvelopeEventLog::new(session_log, policies, keys));
                callback(wrapped)
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EncryptionPolicy, KeyScope};
    use crate::domain::repositories::PolicyStore;
    use crate::domain::value_objects::MessageType;
    use crate::infrastructure::repositories::{InMemoryEventLog, InMemoryKeyStore, InMemoryPolicyStore};
    use serde_json::json;

    fn partition() -> Partition {
        Partition::new("acme".to_string()).unwrap()
    }

    async fn envelope_log_with_policy(scope: KeyScope) -> EnvelopeEventLog {
        let policy_store = InMemoryPolicyStore::new();
        policy_store
            .upsert(&EncryptionPolicy::new(
                "p1".to_string(),
                partition(),
                "order".to_string(),
                scope,
                Algorithm::AesGcm,
                None,
            ))
            .await
            .unwrap();
        EnvelopeEventLog::new(
            Arc::new(InMemoryEventLog::new()),
            Arc::new(PolicyResolver::new(Arc::new(policy_store))),
            Arc::new(KeyManager::new(Arc::new(InMemoryKeyStore::new()))),
        )
    }

    #[tokio::test]
    async fn round_trips_through_encrypt_and_decrypt() {
        let log = envelope_log_with_policy(KeyScope::Stream).await;
        let stream_id = StreamId::new("order-1".to_string()).unwrap();
        log.append_to_stream(
            &stream_id,
            &partition(),
            "order",
            ExpectedVersion::Any,
            vec![NewMessage::new(MessageType::new("order.placed".to_string()).unwrap(), json!({"sku": "SKU-1"}))],
        )
        .await
        .unwrap();

        let result = log.read_stream(&stream_id, &partition(), ReadStreamOptions::default()).await.unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].message_data(), &json!({"sku": "SKU-1"}));
        assert!(result.messages[0].is_encrypted());
    }

    #[tokio::test]
    async fn fails_closed_on_append_without_policy() {
        let log = EnvelopeEventLog::new(
            Arc::new(InMemoryEventLog::new()),
            Arc::new(PolicyResolver::new(Arc::new(InMemoryPolicyStore::new()))),
            Arc::new(KeyManager::new(Arc::new(InMemoryKeyStore::new()))),
        );
        let stream_id = StreamId::new("order-1".to_string()).unwrap();
        let result = log
            .append_to_stream(
                &stream_id,
                &partition(),
                "order",
                ExpectedVersion::Any,
                vec![NewMessage::new(MessageType::new("order.placed".to_string()).unwrap(), json!({}))],
            )
            .await;
        assert!(matches!(result, Err(CoreError::PolicyResolutionFailed(_))));
    }

    #[tokio::test]
    async fn destroyed_key_yields_silent_gap_on_read() {
        let log = envelope_log_with_policy(KeyScope::Stream).await;
        let stream_id = StreamId::new("order-1".to_string()).unwrap();
        let event_type = MessageType::new("order.placed".to_string()).unwrap();
        log.append_to_stream(
            &stream_id,
            &partition(),
            "order",
            ExpectedVersion::Any,
            vec![
                NewMessage::new(event_type.clone(), json!({"n": 1})),
                NewMessage::new(event_type, json!({"n": 2})),
            ],
        )
        .await
        .unwrap();

        log.keys.destroy_partition_keys(&partition()).await.unwrap();

        let result = log.read_stream(&stream_id, &partition(), ReadStreamOptions::default()).await.unwrap();
        assert!(result.messages.is_empty());
        assert_eq!(result.current_version, 2);
    }
}
