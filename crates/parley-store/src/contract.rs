//! The save/load contract between the chat core and whatever persists its
//! state.
//!
//! The core only ever talks to these traits; [`Database`] is the default
//! implementation. A core running without a store proceeds with empty
//! state.

use parley_shared::identity::IdentityExport;
use parley_shared::types::{ConversationId, EncryptedMessage};

use crate::database::Database;
use crate::error::Result;
use crate::models::ConversationMeta;

/// Persistence of conversations and their messages.
pub trait ConversationStore: Send {
    /// Persist a conversation's metadata (no messages, key in interchange
    /// form).
    fn save_conversation_meta(&self, meta: &ConversationMeta) -> Result<()>;

    /// Load the metadata of every known conversation.
    fn load_all_conversation_meta(&self) -> Result<Vec<ConversationMeta>>;

    /// Persist one message under its conversation. Idempotent by message id.
    fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &EncryptedMessage,
    ) -> Result<()>;

    /// Load a conversation's messages, ascending by timestamp.
    fn load_messages(&self, conversation_id: &ConversationId) -> Result<Vec<EncryptedMessage>>;
}

/// Persistence of the local identity.
pub trait IdentityStore: Send {
    fn save_identity(&self, export: &IdentityExport) -> Result<()>;

    /// `None` means no identity has been created yet.
    fn load_identity(&self) -> Result<Option<IdentityExport>>;
}

impl ConversationStore for Database {
    fn save_conversation_meta(&self, meta: &ConversationMeta) -> Result<()> {
        self.upsert_conversation(meta)
    }

    fn load_all_conversation_meta(&self) -> Result<Vec<ConversationMeta>> {
        self.list_conversations()
    }

    fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &EncryptedMessage,
    ) -> Result<()> {
        self.insert_message(conversation_id, message)
    }

    fn load_messages(&self, conversation_id: &ConversationId) -> Result<Vec<EncryptedMessage>> {
        self.get_messages_for_conversation(conversation_id)
    }
}

impl IdentityStore for Database {
    fn save_identity(&self, export: &IdentityExport) -> Result<()> {
        self.save_local_identity(export)
    }

    fn load_identity(&self) -> Result<Option<IdentityExport>> {
        self.load_local_identity()
    }
}
