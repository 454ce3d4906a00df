use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::NONCE_SIZE;
use crate::crypto::SymmetricKeyJwk;
use crate::error::ParleyError;
use crate::identity::PublicKeyJwk;
use crate::types::{ConversationId, EncryptedMessage, UserId};

/// All wire traffic exchanged over an open peer channel, as JSON with a
/// `type` discriminant. Every variant carries the sender-assigned timestamp
/// in wall-clock milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Self-describing identity announcement, sent by both sides as soon as
    /// the channel opens.
    #[serde(rename = "identity", rename_all = "camelCase")]
    IdentityAnnounce {
        id: UserId,
        name: String,
        public_key: PublicKeyJwk,
        timestamp: i64,
    },

    /// An encrypted chat message. Ciphertext and nonce travel base64-encoded.
    #[serde(rename = "text", rename_all = "camelCase")]
    Text {
        id: Uuid,
        sender_id: UserId,
        conversation_id: ConversationId,
        ciphertext: String,
        nonce: String,
        timestamp: i64,
    },

    /// In-band delivery of a group's symmetric key to one recipient.
    #[serde(rename = "groupKey", rename_all = "camelCase")]
    GroupKey {
        sender_id: UserId,
        group_id: ConversationId,
        group_name: String,
        key: SymmetricKeyJwk,
        timestamp: i64,
    },
}

impl WireMessage {
    /// Serialize to the JSON wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParleyError> {
        serde_json::to_vec(self).map_err(|e| ParleyError::Serialization(e.to_string()))
    }

    /// Deserialize from the JSON wire encoding.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParleyError> {
        serde_json::from_slice(data).map_err(|e| ParleyError::Protocol(e.to_string()))
    }

    /// Build a `text` frame from a stored message.
    pub fn from_encrypted(message: &EncryptedMessage) -> Self {
        WireMessage::Text {
            id: message.id,
            sender_id: message.sender_id.clone(),
            conversation_id: message.conversation_id.clone(),
            ciphertext: b64_encode(&message.ciphertext),
            nonce: b64_encode(&message.nonce),
            timestamp: message.timestamp,
        }
    }

    /// Convert a `text` frame back into a stored message. Fails on any other
    /// variant or on malformed base64 fields.
    pub fn into_encrypted(self) -> Result<EncryptedMessage, ParleyError> {
        match self {
            WireMessage::Text {
                id,
                sender_id,
                conversation_id,
                ciphertext,
                nonce,
                timestamp,
            } => {
                let ciphertext = b64_decode(&ciphertext)
                    .map_err(|e| ParleyError::Protocol(format!("bad ciphertext: {e}")))?;
                let nonce_bytes = b64_decode(&nonce)
                    .map_err(|e| ParleyError::Protocol(format!("bad nonce: {e}")))?;

                if nonce_bytes.len() != NONCE_SIZE {
                    return Err(ParleyError::Protocol("bad nonce length".to_string()));
                }
                let mut nonce = [0u8; NONCE_SIZE];
                nonce.copy_from_slice(&nonce_bytes);

                Ok(EncryptedMessage {
                    id,
                    sender_id,
                    conversation_id,
                    ciphertext,
                    nonce,
                    timestamp,
                })
            }
            other => Err(ParleyError::Protocol(format!(
                "expected text frame, got {other:?}"
            ))),
        }
    }
}

fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.decode(s)
}
