//! Runtime conversation state.
//!
//! A [`Conversation`] is the addressable unit of message history, direct or
//! group. Messages are append-only, deduplicated by id, and kept sorted by
//! sender timestamp.

use tracing::warn;
use uuid::Uuid;

use parley_shared::crypto::{self, SymmetricKey};
use parley_shared::types::{ConversationId, ConversationKind, EncryptedMessage, UserId};
use parley_store::ConversationMeta;

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Peer name for direct conversations, group name for groups.
    pub name: String,
    /// Known members, the local user included.
    pub members: Vec<UserId>,
    /// Present only for groups, and only once the key has arrived.
    pub group_key: Option<SymmetricKey>,
    /// Sorted ascending by timestamp.
    pub messages: Vec<EncryptedMessage>,
    /// Zero iff this conversation is the one currently in focus.
    pub unread_count: u32,
}

/// A message prepared for rendering: decrypted if possible, a placeholder
/// otherwise. Ordering and identity always survive.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub id: Uuid,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: i64,
    pub readable: bool,
}

impl Conversation {
    /// A direct conversation with one peer.
    pub fn direct(peer_id: UserId, name: String, me: UserId) -> Self {
        Self {
            id: ConversationId::direct(&peer_id),
            kind: ConversationKind::Direct,
            name,
            members: vec![me, peer_id],
            group_key: None,
            messages: Vec::new(),
            unread_count: 0,
        }
    }

    /// A group conversation under a known id. `group_key` is `None` for
    /// groups we have heard about but hold no key for yet.
    pub fn group(
        id: ConversationId,
        name: String,
        me: UserId,
        group_key: Option<SymmetricKey>,
    ) -> Self {
        Self {
            id,
            kind: ConversationKind::Group,
            name,
            members: vec![me],
            group_key,
            messages: Vec::new(),
            unread_count: 0,
        }
    }

    /// Rebuild from persisted metadata (messages are loaded separately).
    pub fn from_meta(meta: &ConversationMeta) -> Self {
        let group_key = meta.group_key.as_ref().and_then(|jwk| {
            crypto::import_key(jwk)
                .map_err(|e| warn!(conversation = %meta.id, error = %e, "Stored group key unusable"))
                .ok()
        });

        Self {
            id: meta.id.clone(),
            kind: meta.kind,
            name: meta.name.clone(),
            members: meta.members.clone(),
            group_key,
            messages: Vec::new(),
            unread_count: meta.unread_count,
        }
    }

    /// The persistence-boundary view: no messages, key in interchange form.
    pub fn to_meta(&self) -> ConversationMeta {
        ConversationMeta {
            id: self.id.clone(),
            kind: self.kind,
            name: self.name.clone(),
            members: self.members.clone(),
            group_key: self.group_key.as_ref().map(crypto::export_key),
            unread_count: self.unread_count,
        }
    }

    /// Insert a message, keeping `messages` sorted by timestamp.
    ///
    /// Returns `false` if a message with the same id already exists; the
    /// insertion is idempotent.
    pub fn insert_message(&mut self, message: EncryptedMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        self.messages.sort_by_key(|m| m.timestamp);
        true
    }

    /// Record a member, deduplicated. Returns `true` if it was new.
    pub fn add_member(&mut self, member: UserId) -> bool {
        if self.members.contains(&member) {
            return false;
        }
        self.members.push(member);
        true
    }
}
