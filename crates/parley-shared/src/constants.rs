/// ChaCha20-Poly1305 nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for ChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Length of a derived user id in hex characters
pub const USER_ID_LEN: usize = 16;

/// Prefix for group conversation ids, distinct from user ids
pub const GROUP_ID_PREFIX: &str = "grp-";

/// Prefix for temporary session ids used while a handshake is in flight
pub const PENDING_ID_PREFIX: &str = "pending-";

/// JWK curve / key type identifiers for key interchange
pub const JWK_CRV_X25519: &str = "X25519";
pub const JWK_KTY_OKP: &str = "OKP";
pub const JWK_KTY_OCT: &str = "oct";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_PEER_KEY: &str = "parley-peer-key-v1";

/// Placeholder shown for messages that cannot be decrypted
pub const UNREADABLE_PLACEHOLDER: &str = "[unable to decrypt]";
