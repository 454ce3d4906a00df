use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::{
    JWK_CRV_X25519, JWK_KTY_OKP, KDF_CONTEXT_PEER_KEY, PUBKEY_SIZE, USER_ID_LEN,
};
use crate::crypto::{b64url_decode, b64url_encode, SymmetricKey};
use crate::error::IdentityError;
use crate::types::UserId;

/// A user's cryptographic identity: an X25519 key-agreement pair plus a
/// display name. The user id is derived from the public key, so it is
/// self-certifying and never reassigned.
#[derive(Clone)]
pub struct Identity {
    secret: StaticSecret,
    display_name: String,
}

/// Public key in JWK interchange form. Field order matches the canonical
/// (alphabetical) JSON encoding that the user id is derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyJwk {
    pub crv: String,
    pub kty: String,
    pub x: String,
}

/// Serializable format for storing/exporting identity
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub secret_key: [u8; 32],
    pub display_name: String,
}

impl Identity {
    /// Generate a new random identity.
    ///
    /// Fails only if the OS entropy source is unavailable; callers treat
    /// that as fatal.
    pub fn generate(display_name: impl Into<String>) -> Result<Self, IdentityError> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| IdentityError::GenerationFailed)?;

        Ok(Self {
            secret: StaticSecret::from(bytes),
            display_name: display_name.into(),
        })
    }

    /// Restore identity from a serialized export
    pub fn from_export(export: &IdentityExport) -> Self {
        Self {
            secret: StaticSecret::from(export.secret_key),
            display_name: export.display_name.clone(),
        }
    }

    /// Export identity for serialization
    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            secret_key: self.secret.to_bytes(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Public key in JWK interchange form.
    pub fn public_key_jwk(&self) -> PublicKeyJwk {
        PublicKeyJwk {
            crv: JWK_CRV_X25519.to_string(),
            kty: JWK_KTY_OKP.to_string(),
            x: b64url_encode(self.public_key().as_bytes()),
        }
    }

    /// Derived user id: `hex(SHA-256(canonical-JSON(publicKey)))[0..16]`.
    pub fn user_id(&self) -> UserId {
        derive_user_id(&self.public_key_jwk())
    }

    /// Derive the per-pair symmetric key: X25519 Diffie-Hellman with the
    /// peer's public key, then a BLAKE3 KDF down to 256 bits. Both parties
    /// derive the identical key.
    pub fn derive_shared_key(&self, peer: &PublicKeyJwk) -> Result<SymmetricKey, IdentityError> {
        let peer_key = import_public_key(peer)?;
        let dh = self.secret.diffie_hellman(&peer_key);

        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PEER_KEY);
        hasher.update(dh.as_bytes());
        let hash = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&hash.as_bytes()[..32]);
        Ok(key)
    }
}

/// Derive a user id from a public key. Deterministic: the same public key
/// always yields the same id.
pub fn derive_user_id(jwk: &PublicKeyJwk) -> UserId {
    // PublicKeyJwk declares its fields in alphabetical order, so plain
    // serde_json output is the canonical encoding.
    let canonical = serde_json::to_vec(jwk).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let hex = hex::encode(digest);
    UserId(hex[..USER_ID_LEN].to_string())
}

/// Import an X25519 public key from its JWK interchange form.
pub fn import_public_key(jwk: &PublicKeyJwk) -> Result<PublicKey, IdentityError> {
    if jwk.crv != JWK_CRV_X25519 || jwk.kty != JWK_KTY_OKP {
        return Err(IdentityError::InvalidKeyBytes);
    }

    let bytes = b64url_decode(&jwk.x).map_err(|_| IdentityError::InvalidKeyBytes)?;
    if bytes.len() != PUBKEY_SIZE {
        return Err(IdentityError::InvalidKeyBytes);
    }

    let mut arr = [0u8; PUBKEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(PublicKey::from(arr))
}
