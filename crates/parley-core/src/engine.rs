//! The chat engine: reconciles live session state with conversation
//! history.
//!
//! One engine owns the session registry and the conversation map; every
//! mutation goes through its `&mut self` transition methods, so readers
//! always observe a consistent snapshot. Transport events are fed in by
//! the caller's event loop; crypto and transport operations suspend
//! cooperatively without blocking other sessions' progress.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_net::handshake::{self, HandshakeOutcome};
use parley_net::sessions::SessionRegistry;
use parley_net::transport::{self, TransportCommand, TransportEvent, TransportHandle};
use parley_shared::constants::UNREADABLE_PLACEHOLDER;
use parley_shared::crypto::{self, SymmetricKey, SymmetricKeyJwk};
use parley_shared::identity::{Identity, PublicKeyJwk};
use parley_shared::protocol::WireMessage;
use parley_shared::types::{
    ConversationId, EncryptedMessage, SessionStatus, UserId,
};
use parley_store::{ConversationStore, IdentityStore};

use crate::conversations::{Conversation, DisplayMessage};
use crate::error::EngineError;
use crate::events::EngineNotification;

/// Capacity of the engine notification channel.
const NOTIFICATION_BUFFER: usize = 256;

/// Load the persisted identity, or create and persist a fresh one.
///
/// "Identity present" means identity creation is skipped entirely.
pub fn load_or_create_identity(
    store: &dyn IdentityStore,
    display_name: &str,
) -> anyhow::Result<Identity> {
    if let Some(export) = store.load_identity()? {
        let identity = Identity::from_export(&export);
        info!(user = %identity.user_id(), "Loaded existing identity");
        return Ok(identity);
    }

    let identity = Identity::generate(display_name)?;
    store.save_identity(&identity.to_export())?;
    info!(user = %identity.user_id(), "Created new identity");
    Ok(identity)
}

pub struct ChatEngine {
    identity: Identity,
    registry: SessionRegistry,
    conversations: HashMap<ConversationId, Conversation>,
    /// The conversation currently in focus, if any.
    active: Option<ConversationId>,
    store: Option<Box<dyn ConversationStore>>,
    transport: mpsc::Sender<TransportCommand>,
    notif_tx: mpsc::Sender<EngineNotification>,
}

impl ChatEngine {
    /// Create an engine over a transport command channel and an optional
    /// store. Returns the engine plus the notification stream for the UI
    /// layer.
    pub fn new(
        identity: Identity,
        transport: mpsc::Sender<TransportCommand>,
        store: Option<Box<dyn ConversationStore>>,
    ) -> (Self, mpsc::Receiver<EngineNotification>) {
        let (notif_tx, notif_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        (
            Self {
                identity,
                registry: SessionRegistry::new(),
                conversations: HashMap::new(),
                active: None,
                store,
                transport,
                notif_tx,
            },
            notif_rx,
        )
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn conversations(&self) -> Vec<&Conversation> {
        self.conversations.values().collect()
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    // ------------------------------------------------------------------
    // Startup reconciliation
    // ------------------------------------------------------------------

    /// Merge persisted conversations and messages into live state.
    ///
    /// A missing or failing store means empty state, never a startup
    /// failure.
    pub fn load_persisted(&mut self) {
        let Some(store) = &self.store else {
            debug!("No store attached, starting with empty state");
            return;
        };

        let metas = match store.load_all_conversation_meta() {
            Ok(metas) => metas,
            Err(e) => {
                warn!(error = %e, "Store unavailable, proceeding with empty state");
                return;
            }
        };

        for meta in metas {
            let mut conversation = Conversation::from_meta(&meta);
            match store.load_messages(&meta.id) {
                Ok(messages) => {
                    for message in messages {
                        conversation.insert_message(message);
                    }
                }
                Err(e) => warn!(conversation = %meta.id, error = %e, "Failed to load messages"),
            }
            self.conversations.insert(meta.id.clone(), conversation);
        }

        info!(count = self.conversations.len(), "Loaded persisted conversations");
    }

    // ------------------------------------------------------------------
    // Connection establishment
    // ------------------------------------------------------------------

    /// Initiator: produce a copy-pasteable invite code.
    pub async fn create_invite(&mut self) -> Result<String, EngineError> {
        Ok(handshake::create_invite(&self.identity, &mut self.registry, &self.transport).await?)
    }

    /// Responder: accept an invite code, returning the answer code to relay
    /// (or `None` if the peer already has a live session).
    pub async fn accept_invite(&mut self, code: &str) -> Result<Option<String>, EngineError> {
        Ok(
            handshake::accept_invite(&self.identity, &mut self.registry, &self.transport, code)
                .await?,
        )
    }

    /// Feed back the code received from the other side, whichever kind it
    /// turns out to be.
    pub async fn complete_handshake(&mut self, code: &str) -> Result<HandshakeOutcome, EngineError> {
        Ok(handshake::complete_handshake(
            &self.identity,
            &mut self.registry,
            &self.transport,
            code,
        )
        .await?)
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    /// Process one transport event. Decode and crypto failures are logged
    /// and contained; they never poison the registry or the conversation
    /// map.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ChannelOpen { handle } => self.on_channel_open(handle).await,
            TransportEvent::ChannelClosed { handle } => self.on_channel_closed(handle),
            TransportEvent::Message { handle, data } => self.on_frame(handle, data).await,
        }
    }

    async fn on_channel_open(&mut self, handle: TransportHandle) {
        let Some(session) = self.registry.find_by_handle(handle) else {
            warn!(handle = %handle, "Channel opened for unknown session");
            return;
        };
        let peer_id = session.peer_id.clone();

        self.registry.update_status(&peer_id, SessionStatus::Connected);
        info!(peer = %peer_id, "Peer connected");

        // Announce ourselves as soon as the channel is up.
        let announce = WireMessage::IdentityAnnounce {
            id: self.identity.user_id(),
            name: self.identity.display_name().to_string(),
            public_key: self.identity.public_key_jwk(),
            timestamp: Utc::now().timestamp_millis(),
        };
        match announce.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = transport::send_frame(&self.transport, handle, bytes).await {
                    warn!(peer = %peer_id, error = %e, "Failed to send identity announcement");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode identity announcement"),
        }

        self.notify(EngineNotification::PeerConnected { peer_id });
    }

    fn on_channel_closed(&mut self, handle: TransportHandle) {
        let Some(session) = self.registry.find_by_handle(handle) else {
            return;
        };
        let peer_id = session.peer_id.clone();

        self.registry
            .update_status(&peer_id, SessionStatus::Disconnected);
        info!(peer = %peer_id, "Peer disconnected");
        self.notify(EngineNotification::PeerDisconnected { peer_id });
    }

    async fn on_frame(&mut self, handle: TransportHandle, data: Vec<u8>) {
        match WireMessage::from_bytes(&data) {
            Ok(WireMessage::IdentityAnnounce {
                id, name, public_key, ..
            }) => self.on_identity_announce(handle, id, name, public_key),

            Ok(frame @ WireMessage::Text { .. }) => match frame.into_encrypted() {
                Ok(message) => self.receive(message),
                Err(e) => warn!(handle = %handle, error = %e, "Malformed text frame"),
            },

            Ok(WireMessage::GroupKey {
                sender_id,
                group_id,
                group_name,
                key,
                ..
            }) => self.on_group_key(sender_id, group_id, group_name, key),

            Err(e) => warn!(handle = %handle, error = %e, "Undecodable frame dropped"),
        }
    }

    /// The peer's self-description: adopt its display name, confirm or
    /// refresh its public key, and make sure a direct conversation exists.
    fn on_identity_announce(
        &mut self,
        handle: TransportHandle,
        id: UserId,
        name: String,
        public_key: PublicKeyJwk,
    ) {
        let Some(session) = self.registry.find_by_handle(handle) else {
            warn!(handle = %handle, "Announcement on unknown channel");
            return;
        };

        let current_id = session.peer_id.clone();
        if current_id != id {
            self.registry.replace_peer_id(&current_id, id.clone());
        }
        self.registry.rename_session(&id, &name);
        self.registry.confirm_public_key(&id, public_key.clone());

        let needs_secret = self
            .registry
            .find_by_peer_id(&id)
            .map(|s| s.shared_secret.is_none())
            .unwrap_or(false);
        if needs_secret {
            match self.identity.derive_shared_key(&public_key) {
                Ok(secret) => self.registry.attach_secret(&id, secret),
                Err(e) => warn!(peer = %id, error = %e, "Could not derive shared secret"),
            }
        }

        debug!(peer = %id, name = %name, "Identity announcement applied");

        // First contact creates the conversation.
        let conv_id = ConversationId::direct(&id);
        let me = self.identity.user_id();
        let conversation = self
            .conversations
            .entry(conv_id)
            .or_insert_with(|| Conversation::direct(id, name.clone(), me));
        conversation.name = name;
        let meta = conversation.to_meta();
        self.persist_meta(&meta);
    }

    /// In-band group-key delivery: create or update the local group
    /// conversation and record the sender as a member.
    fn on_group_key(
        &mut self,
        sender_id: UserId,
        group_id: ConversationId,
        group_name: String,
        key: SymmetricKeyJwk,
    ) {
        let group_key = match crypto::import_key(&key) {
            Ok(key) => key,
            Err(e) => {
                warn!(group = %group_id, error = %e, "Unusable group key dropped");
                return;
            }
        };

        let me = self.identity.user_id();
        let conversation = self
            .conversations
            .entry(group_id.clone())
            .or_insert_with(|| {
                Conversation::group(group_id.clone(), group_name.clone(), me, None)
            });
        conversation.group_key = Some(group_key);
        conversation.name = group_name;
        conversation.add_member(sender_id.clone());

        info!(group = %group_id, from = %sender_id, "Group key received");
        let meta = conversation.to_meta();
        self.persist_meta(&meta);
        self.notify(EngineNotification::GroupKeyReceived {
            conversation_id: group_id,
            sender_id,
        });
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Encrypt and send `plaintext` into a conversation.
    ///
    /// The message is appended and persisted locally, then handed to the
    /// transport for every currently connected member. Disconnected members
    /// simply do not receive it.
    pub async fn send(
        &mut self,
        conversation_id: &ConversationId,
        plaintext: &str,
    ) -> Result<Uuid, EngineError> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| EngineError::UnknownConversation(conversation_id.clone()))?;
        let key = self.resolve_key(conversation)?;

        let sealed = crypto::encrypt(&key, plaintext.as_bytes())?;
        let message = EncryptedMessage {
            id: Uuid::new_v4(),
            sender_id: self.identity.user_id(),
            conversation_id: conversation_id.clone(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            timestamp: Utc::now().timestamp_millis(),
        };

        let frame = WireMessage::from_encrypted(&message).to_bytes()?;

        let me = self.identity.user_id();
        let conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| EngineError::UnknownConversation(conversation_id.clone()))?;
        conversation.insert_message(message.clone());

        self.persist_message(conversation_id, &message);

        // Deliver to every member with an open channel.
        let recipients: Vec<(UserId, TransportHandle)> = self
            .conversations
            .get(conversation_id)
            .map(|c| {
                c.members
                    .iter()
                    .filter(|member| **member != me)
                    .filter_map(|member| self.registry.find_by_peer_id(member))
                    .filter(|session| session.status == SessionStatus::Connected)
                    .filter_map(|session| {
                        session.handle.map(|h| (session.peer_id.clone(), h))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (peer_id, handle) in recipients {
            if let Err(e) = transport::send_frame(&self.transport, handle, frame.clone()).await {
                warn!(peer = %peer_id, error = %e, "Delivery failed");
            }
        }

        debug!(conversation = %conversation_id, id = %message.id, "Message sent");
        Ok(message.id)
    }

    /// Reconcile one incoming message into conversation state.
    ///
    /// Duplicates (same id) are ignored. The unread count grows unless the
    /// conversation is currently focused.
    pub fn receive(&mut self, mut message: EncryptedMessage) {
        let sender = message.sender_id.clone();
        let me = self.identity.user_id();

        // A direct frame is addressed to us under *our* id; locally it
        // lives under the sender's conversation.
        let conv_id = if !message.conversation_id.is_group()
            && message.conversation_id.as_str() == me.as_str()
        {
            ConversationId::direct(&sender)
        } else {
            message.conversation_id.clone()
        };
        message.conversation_id = conv_id.clone();

        let sender_name = self
            .registry
            .find_by_peer_id(&sender)
            .map(|s| s.display_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| sender.short());

        let focused = self.active.as_ref() == Some(&conv_id);

        let conversation = self.conversations.entry(conv_id.clone()).or_insert_with(|| {
            if conv_id.is_group() {
                // A group we hold no key for yet; messages stay visible
                // but unreadable until the key arrives.
                Conversation::group(conv_id.clone(), conv_id.as_str().to_string(), me.clone(), None)
            } else {
                Conversation::direct(sender.clone(), sender_name, me.clone())
            }
        });

        // Membership is learned from traffic.
        if sender != me {
            conversation.add_member(sender.clone());
        }

        let message_id = message.id;
        if !conversation.insert_message(message.clone()) {
            debug!(conversation = %conv_id, id = %message_id, "Duplicate message ignored");
            return;
        }

        if !focused {
            conversation.unread_count += 1;
        }

        let meta = conversation.to_meta();
        self.persist_meta(&meta);
        self.persist_message(&conv_id, &message);

        self.notify(EngineNotification::MessageReceived {
            conversation_id: conv_id,
            message_id,
            sender_id: sender,
        });
    }

    /// Decrypt a conversation's messages for rendering. Messages whose key
    /// is absent or whose decryption fails are rendered as an unreadable
    /// placeholder rather than dropped.
    pub fn decrypt_for_display(&self, conversation_id: &ConversationId) -> Vec<DisplayMessage> {
        let Some(conversation) = self.conversations.get(conversation_id) else {
            return Vec::new();
        };
        let key = self.resolve_key(conversation).ok();

        conversation
            .messages
            .iter()
            .map(|message| {
                let content = key.as_ref().and_then(|key| {
                    crypto::decrypt(key, &message.ciphertext, &message.nonce)
                        .ok()
                        .and_then(|bytes| String::from_utf8(bytes).ok())
                });

                match content {
                    Some(content) => DisplayMessage {
                        id: message.id,
                        sender_id: message.sender_id.clone(),
                        content,
                        timestamp: message.timestamp,
                        readable: true,
                    },
                    None => DisplayMessage {
                        id: message.id,
                        sender_id: message.sender_id.clone(),
                        content: UNREADABLE_PLACEHOLDER.to_string(),
                        timestamp: message.timestamp,
                        readable: false,
                    },
                }
            })
            .collect()
    }

    /// Focus a conversation (or none). Focusing clears its unread count and
    /// persists the cleared value.
    pub fn set_active_conversation(&mut self, conversation_id: Option<ConversationId>) {
        self.active = conversation_id.clone();

        if let Some(id) = conversation_id {
            if let Some(conversation) = self.conversations.get_mut(&id) {
                conversation.unread_count = 0;
                let meta = conversation.to_meta();
                self.persist_meta(&meta);
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// The key that encrypts this conversation's traffic: the peer's shared
    /// secret for direct chats, the group key for groups.
    fn resolve_key(&self, conversation: &Conversation) -> Result<SymmetricKey, EngineError> {
        if conversation.id.is_group() {
            return conversation
                .group_key
                .ok_or_else(|| EngineError::KeyUnavailable(conversation.id.clone()));
        }

        let peer = UserId(conversation.id.as_str().to_string());
        self.registry
            .find_by_peer_id(&peer)
            .and_then(|session| session.shared_secret)
            .ok_or_else(|| EngineError::KeyUnavailable(conversation.id.clone()))
    }

    pub(crate) fn conversation_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub(crate) fn insert_conversation(&mut self, conversation: Conversation) {
        self.conversations
            .insert(conversation.id.clone(), conversation);
    }

    pub(crate) fn transport_tx(&self) -> &mpsc::Sender<TransportCommand> {
        &self.transport
    }

    pub(crate) fn persist_meta(&self, meta: &parley_store::ConversationMeta) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_conversation_meta(meta) {
                warn!(conversation = %meta.id, error = %e, "Failed to persist conversation");
            }
        }
    }

    pub(crate) fn persist_message(
        &self,
        conversation_id: &ConversationId,
        message: &EncryptedMessage,
    ) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_message(conversation_id, message) {
                warn!(conversation = %conversation_id, error = %e, "Failed to persist message");
            }
        }
    }

    pub(crate) fn notify(&self, notification: EngineNotification) {
        if let Err(e) = self.notif_tx.try_send(notification) {
            debug!(error = %e, "Notification dropped");
        }
    }
}
