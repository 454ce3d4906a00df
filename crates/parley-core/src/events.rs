//! Notifications the engine emits for an outer UI layer.

use serde::Serialize;
use uuid::Uuid;

use parley_shared::types::{ConversationId, UserId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineNotification {
    /// A new message landed in a conversation.
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        conversation_id: ConversationId,
        message_id: Uuid,
        sender_id: UserId,
    },
    /// A peer session reached the `Connected` state.
    #[serde(rename_all = "camelCase")]
    PeerConnected { peer_id: UserId },
    /// A peer session dropped to `Disconnected`.
    #[serde(rename_all = "camelCase")]
    PeerDisconnected { peer_id: UserId },
    /// A group key arrived over the wire.
    #[serde(rename_all = "camelCase")]
    GroupKeyReceived {
        conversation_id: ConversationId,
        sender_id: UserId,
    },
}
