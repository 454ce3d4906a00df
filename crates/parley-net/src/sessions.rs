//! Peer session tracking.
//!
//! Maintains an in-memory map of known peers and their per-peer connection
//! state: transport handle, derived shared secret, handshake role, and
//! status. At most one session exists per peer id.

use std::collections::HashMap;

use tracing::debug;

use parley_shared::crypto::SymmetricKey;
use parley_shared::identity::PublicKeyJwk;
use parley_shared::types::{SessionStatus, SignalingRole, UserId};

use crate::transport::TransportHandle;

/// Live connection/handshake state for one peer, independent of any
/// conversation history.
#[derive(Debug, Clone)]
pub struct PeerSession {
    /// The peer's derived id, or a temporary `pending-` id mid-handshake.
    pub peer_id: UserId,
    /// Last known display name (empty until the identity announcement).
    pub display_name: String,
    /// Transport channel handle. Always present while `status` is
    /// `Connected`.
    pub handle: Option<TransportHandle>,
    /// Per-pair symmetric key; absent until key agreement has run.
    pub shared_secret: Option<SymmetricKey>,
    pub status: SessionStatus,
    /// Which side of the handshake created this session.
    pub role: SignalingRole,
    /// The peer's key-agreement public key, once known.
    pub public_key: Option<PublicKeyJwk>,
}

impl PeerSession {
    /// A fresh session in the `Connecting` state.
    pub fn connecting(peer_id: UserId, role: SignalingRole, handle: TransportHandle) -> Self {
        Self {
            peer_id,
            display_name: String::new(),
            handle: Some(handle),
            shared_secret: None,
            status: SessionStatus::Connecting,
            role,
            public_key: None,
        }
    }
}

/// Registry of all known peer sessions, keyed by peer id.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: HashMap<UserId, PeerSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `session.peer_id`.
    ///
    /// Collapse rule for an existing entry: the first writer keeps the
    /// transport handle, the last writer wins on metadata.
    pub fn upsert_session(&mut self, mut session: PeerSession) {
        if let Some(existing) = self.sessions.get(&session.peer_id) {
            if existing.handle.is_some() {
                session.handle = existing.handle;
            }
        }
        debug!(peer = %session.peer_id, status = ?session.status, "Upserting session");
        self.sessions.insert(session.peer_id.clone(), session);
    }

    /// Update a session's status. No-op if `peer_id` is unknown.
    ///
    /// Demoting to `Disconnected` clears the handle, keeping the
    /// connected-implies-handle invariant.
    pub fn update_status(&mut self, peer_id: &UserId, status: SessionStatus) {
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.status = status;
            if status == SessionStatus::Disconnected {
                session.handle = None;
            }
            debug!(peer = %peer_id, status = ?status, "Session status updated");
        }
    }

    /// Attach a derived shared secret. No-op if `peer_id` is unknown.
    pub fn attach_secret(&mut self, peer_id: &UserId, secret: SymmetricKey) {
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.shared_secret = Some(secret);
        }
    }

    /// Update the display name. No-op if `peer_id` is unknown.
    pub fn rename_session(&mut self, peer_id: &UserId, name: &str) {
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.display_name = name.to_string();
        }
    }

    /// Record or refresh the peer's public key. No-op if `peer_id` is
    /// unknown.
    pub fn confirm_public_key(&mut self, peer_id: &UserId, key: PublicKeyJwk) {
        if let Some(session) = self.sessions.get_mut(peer_id) {
            session.public_key = Some(key);
        }
    }

    pub fn find_by_peer_id(&self, peer_id: &UserId) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    /// Locate a session that is mid-handshake in the given role, i.e. still
    /// `Connecting`. Used when the remote identifier is not yet known.
    pub fn find_by_signaling_role(&self, role: SignalingRole) -> Option<&PeerSession> {
        self.sessions
            .values()
            .find(|s| s.role == role && s.status == SessionStatus::Connecting)
    }

    /// Locate the session bound to a transport handle.
    pub fn find_by_handle(&self, handle: TransportHandle) -> Option<&PeerSession> {
        self.sessions.values().find(|s| s.handle == Some(handle))
    }

    /// Re-key a session from a temporary id to the peer's real id.
    ///
    /// If a session already exists under `new_id` the two collapse: the
    /// promoted session's metadata wins, an already-attached transport
    /// handle is kept.
    pub fn replace_peer_id(&mut self, old_id: &UserId, new_id: UserId) {
        if let Some(mut session) = self.sessions.remove(old_id) {
            debug!(old = %old_id, new = %new_id, "Promoting session id");
            session.peer_id = new_id;
            self.upsert_session(session);
        }
    }

    /// All sessions currently in the `Connected` state.
    pub fn connected_sessions(&self) -> Vec<&PeerSession> {
        self.sessions
            .values()
            .filter(|s| s.status == SessionStatus::Connected)
            .collect()
    }

    /// Snapshot of every session.
    pub fn all_sessions(&self) -> Vec<&PeerSession> {
        self.sessions.values().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn session(id: &str, role: SignalingRole, handle: u64) -> PeerSession {
        PeerSession::connecting(user(id), role, TransportHandle(handle))
    }

    #[test]
    fn test_upsert_collapses_to_one_session() {
        let mut registry = SessionRegistry::new();
        registry.upsert_session(session("a1b2c3d4e5f60718", SignalingRole::Initiator, 1));

        let mut second = session("a1b2c3d4e5f60718", SignalingRole::Responder, 2);
        second.display_name = "Alice".to_string();
        second.handle = None;
        registry.upsert_session(second);

        assert_eq!(registry.session_count(), 1);
        let merged = registry.find_by_peer_id(&user("a1b2c3d4e5f60718")).unwrap();
        // first writer keeps the transport, last writer the metadata
        assert_eq!(merged.handle, Some(TransportHandle(1)));
        assert_eq!(merged.display_name, "Alice");
    }

    #[test]
    fn test_targeted_updates_are_noops_for_unknown_peer() {
        let mut registry = SessionRegistry::new();
        registry.update_status(&user("nope"), SessionStatus::Connected);
        registry.attach_secret(&user("nope"), [0u8; 32]);
        registry.rename_session(&user("nope"), "ghost");
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_disconnect_clears_handle() {
        let mut registry = SessionRegistry::new();
        registry.upsert_session(session("a1b2c3d4e5f60718", SignalingRole::Initiator, 7));

        registry.update_status(&user("a1b2c3d4e5f60718"), SessionStatus::Connected);
        assert!(registry
            .find_by_peer_id(&user("a1b2c3d4e5f60718"))
            .unwrap()
            .handle
            .is_some());

        registry.update_status(&user("a1b2c3d4e5f60718"), SessionStatus::Disconnected);
        let demoted = registry.find_by_peer_id(&user("a1b2c3d4e5f60718")).unwrap();
        assert_eq!(demoted.status, SessionStatus::Disconnected);
        assert!(demoted.handle.is_none());
    }

    #[test]
    fn test_find_by_signaling_role_only_matches_connecting() {
        let mut registry = SessionRegistry::new();
        let temp = UserId::temporary();
        registry.upsert_session(PeerSession::connecting(
            temp.clone(),
            SignalingRole::Initiator,
            TransportHandle(1),
        ));
        registry.upsert_session(session("b2c3d4e5f6071829", SignalingRole::Responder, 2));
        registry.update_status(&user("b2c3d4e5f6071829"), SessionStatus::Connected);

        let pending = registry.find_by_signaling_role(SignalingRole::Initiator).unwrap();
        assert_eq!(pending.peer_id, temp);
        assert!(registry.find_by_signaling_role(SignalingRole::Responder).is_none());
    }

    #[test]
    fn test_replace_peer_id_promotes_temporary_session() {
        let mut registry = SessionRegistry::new();
        let temp = UserId::temporary();
        registry.upsert_session(PeerSession::connecting(
            temp.clone(),
            SignalingRole::Initiator,
            TransportHandle(3),
        ));

        registry.replace_peer_id(&temp, user("c3d4e5f607182930"));

        assert!(registry.find_by_peer_id(&temp).is_none());
        let promoted = registry.find_by_peer_id(&user("c3d4e5f607182930")).unwrap();
        assert_eq!(promoted.handle, Some(TransportHandle(3)));
    }

    #[test]
    fn test_find_by_handle() {
        let mut registry = SessionRegistry::new();
        registry.upsert_session(session("a1b2c3d4e5f60718", SignalingRole::Initiator, 42));

        assert!(registry.find_by_handle(TransportHandle(42)).is_some());
        assert!(registry.find_by_handle(TransportHandle(43)).is_none());
    }
}
