//! # parley-net
//!
//! Connection establishment for the Parley messaging core: the transport
//! collaborator contract (typed command/event channels), the peer session
//! registry, the invite/answer handshake state machine, and an in-process
//! transport implementation for tests and local development.

pub mod handshake;
pub mod memory;
pub mod sessions;
pub mod transport;

pub use handshake::{accept_invite, complete_handshake, create_invite, HandshakeOutcome};
pub use sessions::{PeerSession, SessionRegistry};
pub use transport::{TransportCommand, TransportError, TransportEvent, TransportHandle};
