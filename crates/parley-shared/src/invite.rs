use serde::{Deserialize, Serialize};

use crate::crypto::{b64url_decode, b64url_encode, SymmetricKeyJwk};
use crate::error::{GroupError, HandshakeError};
use crate::identity::PublicKeyJwk;
use crate::types::{ConversationId, UserId};

/// Identity of the party that produced a handshake payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub id: UserId,
    pub name: String,
    pub public_key: PublicKeyJwk,
}

/// A copy-pasteable handshake payload: a self-contained transport offer or
/// answer description plus the sender's identity.
///
/// The `kind` tag distinguishes invites from answers, so the single textual
/// channel both travel over never needs structural guessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HandshakeCode {
    #[serde(rename_all = "camelCase")]
    Invite { sdp: String, sender: SenderInfo },
    #[serde(rename_all = "camelCase")]
    Answer { sdp: String, sender: SenderInfo },
}

impl HandshakeCode {
    /// Encode the payload as a base64url string (copiable code).
    pub fn encode(&self) -> Result<String, HandshakeError> {
        let json = serde_json::to_vec(self).map_err(|_| HandshakeError::InvalidCode)?;
        Ok(b64url_encode(&json))
    }

    /// Decode a base64url string back into a handshake payload.
    pub fn decode(code: &str) -> Result<Self, HandshakeError> {
        let bytes = b64url_decode(code).map_err(|_| HandshakeError::InvalidCode)?;
        serde_json::from_slice(&bytes).map_err(|_| HandshakeError::InvalidCode)
    }

    pub fn sender(&self) -> &SenderInfo {
        match self {
            HandshakeCode::Invite { sender, .. } | HandshakeCode::Answer { sender, .. } => sender,
        }
    }

    pub fn sdp(&self) -> &str {
        match self {
            HandshakeCode::Invite { sdp, .. } | HandshakeCode::Answer { sdp, .. } => sdp,
        }
    }
}

/// A portable group invite carrying the group's symmetric key in interchange
/// form. Same base64-JSON shape as peer invites but semantically distinct:
/// feeding one into the other decoder fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GroupInvite {
    pub group_id: ConversationId,
    pub group_name: String,
    pub key: SymmetricKeyJwk,
}

impl GroupInvite {
    pub fn encode(&self) -> Result<String, GroupError> {
        let json = serde_json::to_vec(self).map_err(|_| GroupError::InvalidCode)?;
        Ok(b64url_encode(&json))
    }

    pub fn decode(code: &str) -> Result<Self, GroupError> {
        let bytes = b64url_decode(code).map_err(|_| GroupError::InvalidCode)?;
        serde_json::from_slice(&bytes).map_err(|_| GroupError::InvalidCode)
    }
}
