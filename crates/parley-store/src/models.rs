//! Domain model structs persisted in the local database.

use serde::{Deserialize, Serialize};

use parley_shared::crypto::SymmetricKeyJwk;
use parley_shared::types::{ConversationId, ConversationKind, UserId};

/// A conversation as it crosses the persistence boundary: no message list,
/// and the group key (if any) in exported JWK form rather than raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMeta {
    /// Peer id for direct conversations, `grp-`-prefixed id for groups.
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Display name (peer name for direct, group name for groups).
    pub name: String,
    /// Known member ids, the local user included.
    pub members: Vec<UserId>,
    /// Present only for group conversations.
    pub group_key: Option<SymmetricKeyJwk>,
    /// Unread message count as last persisted.
    pub unread_count: u32,
}
