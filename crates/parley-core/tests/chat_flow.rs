//! End-to-end flows over the in-memory transport: handshake, direct
//! messaging with unread accounting, group key distribution, and startup
//! reconciliation from a real store.

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use parley_core::{load_or_create_identity, ChatEngine, EngineNotification};
use parley_net::memory::{spawn_memory_transport, MemoryNetwork};
use parley_net::transport::TransportEvent;
use parley_shared::crypto;
use parley_shared::identity::Identity;
use parley_shared::types::{ConversationId, EncryptedMessage, SessionStatus, UserId};
use parley_store::Database;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .try_init();
}

struct Node {
    engine: ChatEngine,
    events: mpsc::Receiver<TransportEvent>,
    notifications: mpsc::Receiver<EngineNotification>,
}

fn node(name: &str, network: &MemoryNetwork) -> Node {
    let (cmd_tx, events) = spawn_memory_transport(network);
    let identity = Identity::generate(name).unwrap();
    let (engine, notifications) = ChatEngine::new(identity, cmd_tx, None);
    Node {
        engine,
        events,
        notifications,
    }
}

/// Pull one transport event and feed it to the engine.
async fn step(node: &mut Node) {
    let event = timeout(Duration::from_secs(1), node.events.recv())
        .await
        .expect("expected a transport event")
        .expect("transport endpoint alive");
    node.engine.handle_transport_event(event).await;
}

/// Run the full invite → accept → complete handshake and the identity
/// announcement round. Returns a's conversation id for the b peer.
async fn connect(a: &mut Node, b: &mut Node) -> ConversationId {
    let invite = a.engine.create_invite().await.unwrap();
    let answer = b
        .engine
        .accept_invite(&invite)
        .await
        .unwrap()
        .expect("responder should produce an answer");
    a.engine.complete_handshake(&answer).await.unwrap();

    // Channel opens on both sides, then the announcements cross.
    step(a).await;
    step(b).await;
    step(a).await;
    step(b).await;

    ConversationId::direct(&b.engine.identity().user_id())
}

fn drain(notifications: &mut mpsc::Receiver<EngineNotification>) -> Vec<EngineNotification> {
    let mut out = Vec::new();
    while let Ok(n) = notifications.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn test_handshake_reaches_connected_with_equal_secrets() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);
    let mut b = node("bob", &network);

    connect(&mut a, &mut b).await;

    let a_id = a.engine.identity().user_id();
    let b_id = b.engine.identity().user_id();

    let a_session = a.engine.registry().find_by_peer_id(&b_id).unwrap();
    let b_session = b.engine.registry().find_by_peer_id(&a_id).unwrap();

    assert_eq!(a_session.status, SessionStatus::Connected);
    assert_eq!(b_session.status, SessionStatus::Connected);
    assert!(a_session.handle.is_some());
    assert_eq!(a_session.shared_secret, b_session.shared_secret);
    assert!(a_session.shared_secret.is_some());

    // The announcement round carried names both ways and created the
    // direct conversations.
    assert_eq!(a_session.display_name, "bob");
    assert_eq!(b_session.display_name, "alice");
    assert!(a
        .engine
        .conversation(&ConversationId::direct(&b_id))
        .is_some());
    assert!(b
        .engine
        .conversation(&ConversationId::direct(&a_id))
        .is_some());
}

#[tokio::test]
async fn test_direct_message_roundtrip_and_unread() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);
    let mut b = node("bob", &network);

    let conv_ab = connect(&mut a, &mut b).await;
    let conv_ba = ConversationId::direct(&a.engine.identity().user_id());
    drain(&mut b.notifications);

    a.engine.send(&conv_ab, "Hello").await.unwrap();
    step(&mut b).await;

    let received = b.engine.conversation(&conv_ba).unwrap();
    assert_eq!(received.messages.len(), 1);
    assert_eq!(received.unread_count, 1);

    let display = b.engine.decrypt_for_display(&conv_ba);
    assert_eq!(display.len(), 1);
    assert!(display[0].readable);
    assert_eq!(display[0].content, "Hello");

    let notifications = drain(&mut b.notifications);
    assert!(notifications
        .iter()
        .any(|n| matches!(n, EngineNotification::MessageReceived { .. })));

    // A focused conversation never accumulates unread.
    b.engine.set_active_conversation(Some(conv_ba.clone()));
    assert_eq!(b.engine.conversation(&conv_ba).unwrap().unread_count, 0);

    a.engine.send(&conv_ab, "Still there?").await.unwrap();
    step(&mut b).await;
    let focused = b.engine.conversation(&conv_ba).unwrap();
    assert_eq!(focused.messages.len(), 2);
    assert_eq!(focused.unread_count, 0);
}

#[tokio::test]
async fn test_duplicate_receive_inserts_once() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);
    let mut b = node("bob", &network);

    let conv_ab = connect(&mut a, &mut b).await;
    let conv_ba = ConversationId::direct(&a.engine.identity().user_id());

    a.engine.send(&conv_ab, "once").await.unwrap();
    step(&mut b).await;

    // Replaying the identical frame must not grow the conversation.
    let duplicate = a.engine.conversation(&conv_ab).unwrap().messages[0].clone();
    b.engine.receive(duplicate.clone());
    b.engine.receive(duplicate);

    assert_eq!(b.engine.conversation(&conv_ba).unwrap().messages.len(), 1);
}

#[tokio::test]
async fn test_undecryptable_message_renders_placeholder() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);
    let mut b = node("bob", &network);

    connect(&mut a, &mut b).await;
    let conv_ba = ConversationId::direct(&a.engine.identity().user_id());

    // Sealed under a key b does not hold.
    let rogue_key = crypto::generate_symmetric_key();
    let sealed = crypto::encrypt(&rogue_key, b"ciphertext only").unwrap();
    b.engine.receive(EncryptedMessage {
        id: uuid::Uuid::new_v4(),
        sender_id: a.engine.identity().user_id(),
        conversation_id: conv_ba.clone(),
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce,
        timestamp: 1,
    });

    let display = b.engine.decrypt_for_display(&conv_ba);
    assert_eq!(display.len(), 1);
    assert!(!display[0].readable);
    assert_eq!(display[0].content, "[unable to decrypt]");
}

#[tokio::test]
async fn test_group_key_distribution_and_messaging() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);
    let mut b = node("bob", &network);

    connect(&mut a, &mut b).await;
    let b_id = b.engine.identity().user_id();

    let group_id = a.engine.create_group("ops");
    let code = a.engine.make_group_invite(&group_id).unwrap();

    // Out-of-band join gets the same group with the same key.
    let joined = b.engine.join_group(&code).unwrap();
    assert_eq!(joined, group_id);
    assert_eq!(
        b.engine.conversation(&group_id).unwrap().group_key,
        a.engine.conversation(&group_id).unwrap().group_key,
    );

    // In-band delivery introduces b as a member on a's side and a as a
    // member on b's side.
    a.engine.deliver_group_key(&b_id, &group_id).await.unwrap();
    step(&mut b).await;
    assert!(a
        .engine
        .conversation(&group_id)
        .unwrap()
        .members
        .contains(&b_id));
    assert!(b
        .engine
        .conversation(&group_id)
        .unwrap()
        .members
        .contains(&a.engine.identity().user_id()));

    a.engine.send(&group_id, "standup in 5").await.unwrap();
    step(&mut b).await;

    let display = b.engine.decrypt_for_display(&group_id);
    assert_eq!(display.len(), 1);
    assert_eq!(display[0].content, "standup in 5");

    // Traffic flows the other way too: b learned a's membership.
    b.engine.send(&group_id, "omw").await.unwrap();
    step(&mut a).await;
    let back = a.engine.decrypt_for_display(&group_id);
    assert_eq!(back.len(), 2);
}

#[tokio::test]
async fn test_send_without_key_fails_cleanly() {
    init_tracing();
    let network = MemoryNetwork::new();
    let mut a = node("alice", &network);

    let group_id = {
        // A group shell with no key, as created by traffic for an unknown
        // group.
        let id = ConversationId::group();
        a.engine.receive(EncryptedMessage {
            id: uuid::Uuid::new_v4(),
            sender_id: UserId("b2c3d4e5f6071829".into()),
            conversation_id: id.clone(),
            ciphertext: vec![0xFF],
            nonce: [0u8; 12],
            timestamp: 1,
        });
        id
    };

    let err = a.engine.send(&group_id, "into the void").await;
    assert!(matches!(
        err,
        Err(parley_core::EngineError::KeyUnavailable(_))
    ));

    // The unreadable message is still visible.
    let display = a.engine.decrypt_for_display(&group_id);
    assert_eq!(display.len(), 1);
    assert!(!display[0].readable);
}

#[tokio::test]
async fn test_identity_and_history_survive_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("parley.db");
    let network = MemoryNetwork::new();

    let group_id;
    let first_user;
    {
        let db = Database::open_at(&db_path).unwrap();
        let identity = load_or_create_identity(&db, "alice").unwrap();
        first_user = identity.user_id();

        let (cmd_tx, _events) = spawn_memory_transport(&network);
        let (mut engine, _notifications) =
            ChatEngine::new(identity, cmd_tx, Some(Box::new(db)));

        group_id = engine.create_group("ops");
        engine.send(&group_id, "note to self").await.unwrap();
    }

    // A fresh process: same identity, same conversation, same readable
    // history.
    let db = Database::open_at(&db_path).unwrap();
    let identity = load_or_create_identity(&db, "ignored").unwrap();
    assert_eq!(identity.user_id(), first_user);

    let (cmd_tx, _events) = spawn_memory_transport(&network);
    let (mut engine, _notifications) = ChatEngine::new(identity, cmd_tx, Some(Box::new(db)));
    engine.load_persisted();

    let conversation = engine.conversation(&group_id).expect("group persisted");
    assert_eq!(conversation.messages.len(), 1);
    assert!(conversation.group_key.is_some());

    let display = engine.decrypt_for_display(&group_id);
    assert_eq!(display[0].content, "note to self");
}

#[tokio::test]
async fn test_engine_without_store_starts_empty() {
    init_tracing();
    let network = MemoryNetwork::new();
    let (cmd_tx, _events) = spawn_memory_transport(&network);
    let identity = Identity::generate("loner").unwrap();
    let (mut engine, _notifications) = ChatEngine::new(identity, cmd_tx, None);

    engine.load_persisted();
    assert!(engine.conversations().is_empty());
}
