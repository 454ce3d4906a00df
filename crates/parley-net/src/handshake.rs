//! Connection-establishment state machine.
//!
//! An initiator turns a transport offer into a copy-pasteable invite code;
//! a responder turns that code into an answer code and derives the shared
//! secret immediately; the initiator applies the answer and derives the
//! same secret. Both sides then wait for the transport to report the
//! channel open, at which point the engine exchanges identity
//! announcements.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_shared::error::HandshakeError;
use parley_shared::identity::Identity;
use parley_shared::invite::{HandshakeCode, SenderInfo};
use parley_shared::types::{SessionStatus, SignalingRole, UserId};

use crate::sessions::{PeerSession, SessionRegistry};
use crate::transport::{self, TransportCommand};

/// Result of feeding a handshake code into [`complete_handshake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The code was an answer to our pending invite; the session is keyed
    /// and waiting for the channel to open.
    AnswerApplied { peer_id: UserId },
    /// The code was a fresh invite; `code` is the answer the user must
    /// relay back to the initiator.
    AnswerProduced { peer_id: UserId, code: String },
    /// The code was an invite from a peer we already have a live session
    /// with; nothing was created.
    AlreadyKnown { peer_id: UserId },
}

fn sender_info(identity: &Identity) -> SenderInfo {
    SenderInfo {
        id: identity.user_id(),
        name: identity.display_name().to_string(),
        public_key: identity.public_key_jwk(),
    }
}

/// Initiator: open a transport offer, wait for candidate gathering, and
/// package the result as an invite code. The new session is registered
/// under a temporary peer id until the answer reveals the real one.
pub async fn create_invite(
    identity: &Identity,
    registry: &mut SessionRegistry,
    cmd_tx: &mpsc::Sender<TransportCommand>,
) -> Result<String, HandshakeError> {
    let (handle, sdp) = transport::create_offer(cmd_tx)
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    let temp_id = UserId::temporary();
    debug!(session = %temp_id, handle = %handle, "Offer created, awaiting answer");

    registry.upsert_session(PeerSession::connecting(
        temp_id,
        SignalingRole::Initiator,
        handle,
    ));

    HandshakeCode::Invite {
        sdp,
        sender: sender_info(identity),
    }
    .encode()
}

/// Responder: decode an invite code, open a transport answer against it,
/// derive the shared secret (the initiator's public key is already in
/// hand), and return the answer code to relay back.
///
/// An invite from a peer with a live session is a warning, not a duplicate:
/// `Ok(None)` is returned and the registry is untouched.
pub async fn accept_invite(
    identity: &Identity,
    registry: &mut SessionRegistry,
    cmd_tx: &mpsc::Sender<TransportCommand>,
    code: &str,
) -> Result<Option<String>, HandshakeError> {
    match HandshakeCode::decode(code)? {
        HandshakeCode::Invite { sdp, sender } => {
            accept_decoded(identity, registry, cmd_tx, sdp, sender).await
        }
        HandshakeCode::Answer { .. } => {
            warn!("Expected an invite code but got an answer");
            Err(HandshakeError::InvalidCode)
        }
    }
}

async fn accept_decoded(
    identity: &Identity,
    registry: &mut SessionRegistry,
    cmd_tx: &mpsc::Sender<TransportCommand>,
    sdp: String,
    sender: SenderInfo,
) -> Result<Option<String>, HandshakeError> {
    if let Some(existing) = registry.find_by_peer_id(&sender.id) {
        // A disconnected session may be re-established; a live one is left
        // alone.
        if existing.status != SessionStatus::Disconnected {
            warn!(peer = %sender.id, "Ignoring invite from peer with a live session");
            return Ok(None);
        }
    }

    let shared_secret = identity
        .derive_shared_key(&sender.public_key)
        .map_err(|_| HandshakeError::InvalidCode)?;

    let (handle, answer_sdp) = transport::accept_offer(cmd_tx, sdp)
        .await
        .map_err(|e| HandshakeError::Transport(e.to_string()))?;

    let mut session = PeerSession::connecting(sender.id.clone(), SignalingRole::Responder, handle);
    session.display_name = sender.name.clone();
    session.shared_secret = Some(shared_secret);
    session.public_key = Some(sender.public_key.clone());
    registry.upsert_session(session);

    info!(peer = %sender.id, "Invite accepted, answer ready");

    HandshakeCode::Answer {
        sdp: answer_sdp,
        sender: sender_info(identity),
    }
    .encode()
    .map(Some)
}

/// Feed back the code the user received. The tag says whether it is the
/// answer to our pending invite or a fresh invite that crossed ours in
/// flight; either way the session ends up keyed and waiting for the
/// channel to open.
pub async fn complete_handshake(
    identity: &Identity,
    registry: &mut SessionRegistry,
    cmd_tx: &mpsc::Sender<TransportCommand>,
    code: &str,
) -> Result<HandshakeOutcome, HandshakeError> {
    match HandshakeCode::decode(code)? {
        HandshakeCode::Answer { sdp, sender } => {
            let pending = registry
                .find_by_signaling_role(SignalingRole::Initiator)
                .ok_or_else(|| {
                    warn!("Answer received but no session is awaiting one");
                    HandshakeError::InvalidCode
                })?;

            let temp_id = pending.peer_id.clone();
            let handle = pending
                .handle
                .ok_or_else(|| HandshakeError::Transport("pending offer lost its channel".into()))?;

            transport::apply_answer(cmd_tx, handle, sdp)
                .await
                .map_err(|e| HandshakeError::Transport(e.to_string()))?;

            let shared_secret = identity
                .derive_shared_key(&sender.public_key)
                .map_err(|_| HandshakeError::InvalidCode)?;

            registry.replace_peer_id(&temp_id, sender.id.clone());
            registry.rename_session(&sender.id, &sender.name);
            registry.confirm_public_key(&sender.id, sender.public_key);
            registry.attach_secret(&sender.id, shared_secret);

            info!(peer = %sender.id, "Answer applied, secret derived");
            Ok(HandshakeOutcome::AnswerApplied { peer_id: sender.id })
        }

        HandshakeCode::Invite { sdp, sender } => {
            // Simultaneous initiation: the other side sent us an invite
            // before seeing ours. Answer it and hand the code back for the
            // user to relay.
            let peer_id = sender.id.clone();
            match accept_decoded(identity, registry, cmd_tx, sdp, sender).await? {
                Some(code) => Ok(HandshakeOutcome::AnswerProduced { peer_id, code }),
                None => Ok(HandshakeOutcome::AlreadyKnown { peer_id }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{spawn_memory_transport, MemoryNetwork};
    use crate::transport::TransportEvent;
    use tokio::sync::mpsc;

    struct Peer {
        identity: Identity,
        registry: SessionRegistry,
        cmd_tx: mpsc::Sender<TransportCommand>,
        events: mpsc::Receiver<TransportEvent>,
    }

    fn peer(name: &str, network: &MemoryNetwork) -> Peer {
        let (cmd_tx, events) = spawn_memory_transport(network);
        Peer {
            identity: Identity::generate(name).unwrap(),
            registry: SessionRegistry::new(),
            cmd_tx,
            events,
        }
    }

    async fn expect_open(peer: &mut Peer) {
        match peer.events.recv().await {
            Some(TransportEvent::ChannelOpen { .. }) => {}
            other => panic!("expected ChannelOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_handshake_derives_equal_secrets() {
        let network = MemoryNetwork::new();
        let mut alice = peer("alice", &network);
        let mut bob = peer("bob", &network);

        let invite = create_invite(&alice.identity, &mut alice.registry, &alice.cmd_tx)
            .await
            .unwrap();
        assert!(alice
            .registry
            .find_by_signaling_role(SignalingRole::Initiator)
            .is_some());

        let answer = accept_invite(&bob.identity, &mut bob.registry, &bob.cmd_tx, &invite)
            .await
            .unwrap()
            .expect("responder should produce an answer");

        let outcome =
            complete_handshake(&alice.identity, &mut alice.registry, &alice.cmd_tx, &answer)
                .await
                .unwrap();
        assert_eq!(
            outcome,
            HandshakeOutcome::AnswerApplied {
                peer_id: bob.identity.user_id()
            }
        );

        expect_open(&mut alice).await;
        expect_open(&mut bob).await;

        let a_session = alice
            .registry
            .find_by_peer_id(&bob.identity.user_id())
            .unwrap();
        let b_session = bob
            .registry
            .find_by_peer_id(&alice.identity.user_id())
            .unwrap();

        assert!(!a_session.peer_id.is_temporary());
        assert_eq!(a_session.shared_secret, b_session.shared_secret);
        assert!(a_session.shared_secret.is_some());
    }

    #[tokio::test]
    async fn test_complete_handshake_routes_fresh_invite() {
        let network = MemoryNetwork::new();
        let alice = peer("alice", &network);
        let mut bob = peer("bob", &network);

        let invite = {
            let mut registry = alice.registry.clone();
            create_invite(&alice.identity, &mut registry, &alice.cmd_tx)
                .await
                .unwrap()
        };

        // Bob has no pending offer; the payload is treated as a fresh
        // invite and an answer comes back for relaying.
        let outcome = complete_handshake(&bob.identity, &mut bob.registry, &bob.cmd_tx, &invite)
            .await
            .unwrap();

        match outcome {
            HandshakeOutcome::AnswerProduced { peer_id, code } => {
                assert_eq!(peer_id, alice.identity.user_id());
                assert!(HandshakeCode::decode(&code).is_ok());
            }
            other => panic!("expected AnswerProduced, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_invite_is_a_warning_not_a_session() {
        let network = MemoryNetwork::new();
        let mut alice = peer("alice", &network);
        let mut bob = peer("bob", &network);

        let invite = create_invite(&alice.identity, &mut alice.registry, &alice.cmd_tx)
            .await
            .unwrap();

        let first = accept_invite(&bob.identity, &mut bob.registry, &bob.cmd_tx, &invite)
            .await
            .unwrap();
        assert!(first.is_some());
        assert_eq!(bob.registry.session_count(), 1);

        let again = accept_invite(&bob.identity, &mut bob.registry, &bob.cmd_tx, &invite)
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(bob.registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_code_leaves_state_untouched() {
        let network = MemoryNetwork::new();
        let mut bob = peer("bob", &network);

        let err = complete_handshake(&bob.identity, &mut bob.registry, &bob.cmd_tx, "!!!").await;
        assert!(matches!(err, Err(HandshakeError::InvalidCode)));
        assert_eq!(bob.registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_without_pending_offer_is_invalid() {
        let network = MemoryNetwork::new();
        let mut alice = peer("alice", &network);
        let mut bob = peer("bob", &network);

        let invite = create_invite(&alice.identity, &mut alice.registry, &alice.cmd_tx)
            .await
            .unwrap();
        let answer = accept_invite(&bob.identity, &mut bob.registry, &bob.cmd_tx, &invite)
            .await
            .unwrap()
            .unwrap();

        // A third party with no pending offer cannot apply the answer.
        let mut carol = peer("carol", &network);
        let err =
            complete_handshake(&carol.identity, &mut carol.registry, &carol.cmd_tx, &answer).await;
        assert!(matches!(err, Err(HandshakeError::InvalidCode)));
    }
}
