//! # parley-store
//!
//! Local storage for the Parley messaging core, backed by SQLite.
//!
//! The crate defines the save/load contract the core depends on
//! ([`ConversationStore`], [`IdentityStore`]) and a synchronous
//! [`Database`] handle implementing it, with typed CRUD helpers for every
//! domain model. Message content is stored encrypted; the raw group key
//! never crosses the persistence boundary (only its interchange form does).

pub mod contract;
pub mod conversations;
pub mod database;
pub mod identity;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use contract::{ConversationStore, IdentityStore};
pub use database::Database;
pub use error::StoreError;
pub use models::*;
