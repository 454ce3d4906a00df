use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::{JWK_KTY_OCT, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Result of an AEAD encryption: ciphertext plus the fresh nonce it was
/// sealed under. The nonce is never reused for the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encrypted {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

/// Symmetric key in JWK interchange form, as carried by group invites and
/// persisted conversation metadata. Field order matches the canonical
/// (alphabetical) JSON encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymmetricKeyJwk {
    pub k: String,
    pub kty: String,
}

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Encrypted, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(Encrypted {
        ciphertext,
        nonce: nonce_bytes,
    })
}

pub fn decrypt(
    key: &SymmetricKey,
    ciphertext: &[u8],
    nonce: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Export a symmetric key to its JWK interchange form.
pub fn export_key(key: &SymmetricKey) -> SymmetricKeyJwk {
    SymmetricKeyJwk {
        k: b64url_encode(key),
        kty: JWK_KTY_OCT.to_string(),
    }
}

/// Import a symmetric key from its JWK interchange form.
pub fn import_key(jwk: &SymmetricKeyJwk) -> Result<SymmetricKey, CryptoError> {
    let bytes = b64url_decode(&jwk.k).map_err(|_| CryptoError::InvalidKeyLength)?;
    if bytes.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength);
    }
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

pub(crate) fn b64url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

pub(crate) fn b64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.decode(s.trim())
}
