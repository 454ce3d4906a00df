use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{GROUP_ID_PREFIX, NONCE_SIZE, PENDING_ID_PREFIX};

// User identity = 16 hex chars derived from the public key (see identity.rs).
// Sessions that are mid-handshake carry a temporary `pending-` id until the
// remote identity is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn temporary() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", PENDING_ID_PREFIX, &suffix[..8]))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(PENDING_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Conversation id: equals the peer id for direct chats, or a generated
// `grp-`-prefixed id for groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn direct(peer: &UserId) -> Self {
        Self(peer.0.clone())
    }

    pub fn group() -> Self {
        Self(format!("{}{}", GROUP_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn is_group(&self) -> bool {
        self.0.starts_with(GROUP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Which side of the handshake a session was created on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalingRole {
    Initiator,
    Responder,
}

/// An encrypted chat message. Append-only; two messages with the same `id`
/// are the same logical message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Globally unique message id (random UUID v4).
    pub id: Uuid,
    /// Derived id of the sender.
    pub sender_id: UserId,
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// AEAD ciphertext (opaque bytes).
    pub ciphertext: Vec<u8>,
    /// Fresh 96-bit nonce used for this message.
    pub nonce: [u8; NONCE_SIZE],
    /// Sender-assigned wall-clock milliseconds; the sort key within a
    /// conversation.
    pub timestamp: i64,
}
