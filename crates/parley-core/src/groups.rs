//! Group lifecycle: creation, portable invites, joining, and in-band key
//! delivery.

use chrono::Utc;
use tracing::{info, warn};

use parley_net::transport;
use parley_shared::crypto;
use parley_shared::error::GroupError;
use parley_shared::invite::GroupInvite;
use parley_shared::protocol::WireMessage;
use parley_shared::types::{ConversationId, SessionStatus, UserId};

use crate::conversations::Conversation;
use crate::engine::ChatEngine;
use crate::error::EngineError;

impl ChatEngine {
    /// Create a group conversation with a fresh symmetric key; the creator
    /// is its sole member until others appear.
    pub fn create_group(&mut self, name: &str) -> ConversationId {
        let key = crypto::generate_symmetric_key();
        let conversation = Conversation::group(
            ConversationId::group(),
            name.to_string(),
            self.identity().user_id(),
            Some(key),
        );
        let id = conversation.id.clone();

        info!(group = %id, name = %name, "Group created");
        self.persist_meta(&conversation.to_meta());
        self.insert_conversation(conversation);
        id
    }

    /// Export a group's id, name, and key as a portable invite code.
    pub fn make_group_invite(&self, group_id: &ConversationId) -> Result<String, EngineError> {
        let conversation = self
            .conversation(group_id)
            .ok_or_else(|| EngineError::UnknownConversation(group_id.clone()))?;

        if !conversation.id.is_group() {
            return Err(GroupError::NotAGroup.into());
        }
        let key = conversation
            .group_key
            .ok_or_else(|| EngineError::KeyUnavailable(group_id.clone()))?;

        Ok(GroupInvite {
            group_id: conversation.id.clone(),
            group_name: conversation.name.clone(),
            key: crypto::export_key(&key),
        }
        .encode()?)
    }

    /// Join a group from an invite code. An already-known group is
    /// re-selected rather than duplicated. Joining is local: existing
    /// members learn about us from our message traffic, not from the join
    /// itself.
    pub fn join_group(&mut self, code: &str) -> Result<ConversationId, EngineError> {
        let invite = GroupInvite::decode(code)?;
        let key = crypto::import_key(&invite.key).map_err(|_| GroupError::InvalidCode)?;

        if self.conversation(&invite.group_id).is_some() {
            if let Some(existing) = self.conversation_mut(&invite.group_id) {
                existing.group_key = Some(key);
            }
            info!(group = %invite.group_id, "Group already known, re-selecting");
        } else {
            let conversation = Conversation::group(
                invite.group_id.clone(),
                invite.group_name.clone(),
                self.identity().user_id(),
                Some(key),
            );
            self.persist_meta(&conversation.to_meta());
            self.insert_conversation(conversation);
            info!(group = %invite.group_id, name = %invite.group_name, "Group joined");
        }

        self.set_active_conversation(Some(invite.group_id.clone()));
        Ok(invite.group_id)
    }

    /// Hand a group's key to one connected peer over the wire, recording it
    /// as a member. A peer without an open channel is skipped silently, as
    /// with any other undeliverable traffic.
    pub async fn deliver_group_key(
        &mut self,
        peer_id: &UserId,
        group_id: &ConversationId,
    ) -> Result<(), EngineError> {
        let conversation = self
            .conversation(group_id)
            .ok_or_else(|| EngineError::UnknownConversation(group_id.clone()))?;
        if !conversation.id.is_group() {
            return Err(GroupError::NotAGroup.into());
        }
        let key = conversation
            .group_key
            .ok_or_else(|| EngineError::KeyUnavailable(group_id.clone()))?;
        let group_name = conversation.name.clone();

        let handle = self
            .registry()
            .find_by_peer_id(peer_id)
            .filter(|session| session.status == SessionStatus::Connected)
            .and_then(|session| session.handle);

        if let Some(conversation) = self.conversation_mut(group_id) {
            if conversation.add_member(peer_id.clone()) {
                let meta = conversation.to_meta();
                self.persist_meta(&meta);
            }
        }

        let Some(handle) = handle else {
            warn!(peer = %peer_id, group = %group_id, "Peer not connected, key not delivered");
            return Ok(());
        };

        let frame = WireMessage::GroupKey {
            sender_id: self.identity().user_id(),
            group_id: group_id.clone(),
            group_name,
            key: crypto::export_key(&key),
            timestamp: Utc::now().timestamp_millis(),
        }
        .to_bytes()?;

        if let Err(e) = transport::send_frame(self.transport_tx(), handle, frame).await {
            warn!(peer = %peer_id, error = %e, "Group key delivery failed");
        } else {
            info!(peer = %peer_id, group = %group_id, "Group key delivered");
        }
        Ok(())
    }
}
