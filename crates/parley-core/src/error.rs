use thiserror::Error;

use parley_shared::error::{CryptoError, GroupError, HandshakeError, IdentityError, ParleyError};
use parley_shared::types::ConversationId;

/// Errors surfaced by the chat engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// No key can encrypt for this conversation yet: direct peer secret not
    /// derived, or group key missing.
    #[error("No key available for conversation {0}")]
    KeyUnavailable(ConversationId),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Wire(#[from] ParleyError),
}
