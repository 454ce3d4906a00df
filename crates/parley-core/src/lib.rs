//! # parley-core
//!
//! The chat reconciler of the Parley messaging core. A [`ChatEngine`] owns
//! the session registry and the conversation map, drives the handshake and
//! messaging flows over a transport command channel, and keeps persisted
//! history merged with live state: idempotent insertion, timestamp
//! ordering, and unread accounting.

pub mod conversations;
pub mod engine;
pub mod error;
pub mod events;
mod groups;

pub use conversations::{Conversation, DisplayMessage};
pub use engine::{load_or_create_identity, ChatEngine};
pub use error::EngineError;
pub use events::EngineNotification;
