use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Failed to generate keypair")]
    GenerationFailed,
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Invalid handshake code")]
    InvalidCode,

    #[error("Transport unavailable: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Invalid group invite code")]
    InvalidCode,

    #[error("Conversation is not a group")]
    NotAGroup,
}
