use std::sync::Arc;
use std::time::Duration;

use rc_crypto::{EncryptionKeyPair, IdentityKeyPair};
use rc_engine::{ChannelTransport, DispatchOutcome, Engine, EngineConfig, LocalIdentity};
use rc_proto::{ChatState, Direction, KeyExchangeConfirmation, PayloadKind, StreamPayload};
use rc_store::{ChatStore, MemoryStore, SqliteStore};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

struct Node {
    engine: Engine,
    outbox: mpsc::Receiver<StreamPayload>,
    user_id: Uuid,
}

async fn start_node(identity: LocalIdentity, store: Arc<dyn ChatStore>) -> Node {
    rc_engine::logging::try_init();
    let user_id = identity.user_id;
    let (transport, outbox) = ChannelTransport::new(64);
    let engine = Engine::start(EngineConfig::default(), identity, store, Arc::new(transport))
        .await
        .expect("engine start");
    Node {
        engine,
        outbox,
        user_id,
    }
}

/// Take the next payload `from` sent and dispatch it into `to`.
async fn relay(from: &mut Node, to: &Node) -> StreamPayload {
    let payload = timeout(WAIT, from.outbox.recv())
        .await
        .expect("timed out waiting for outbound payload")
        .expect("outbox closed");
    assert!(matches!(
        to.engine.dispatch(payload.clone()),
        DispatchOutcome::Enqueued(_)
    ));
    payload
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    timeout(WAIT, async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

fn chat_state(node: &Node, chat_id: Uuid) -> Option<ChatState> {
    node.engine.protocol().cache().state(chat_id)
}

/// Friend request, acceptance and the full handshake. Returns the chat id.
async fn befriend(a: &mut Node, b: &mut Node) -> Uuid {
    a.engine.protocol().send_friend_request(b.user_id).await.unwrap();
    relay(a, b).await;
    wait_until("friend request", || {
        !b.engine.protocol().pending_friend_requests().is_empty()
    })
    .await;
    let invite = b.engine.protocol().pending_friend_requests()[0].invite_id;
    b.engine.protocol().respond_friend_request(invite, true).await.unwrap();

    relay(b, a).await; // friend response
    let request = relay(a, b).await;
    let chat_id = match request {
        StreamPayload::KeyExchangeRequest(r) => r.chat_id,
        other => panic!("expected key exchange request, got {other:?}"),
    };
    relay(b, a).await; // response
    relay(a, b).await; // initiator confirmation
    relay(b, a).await; // responder confirmation

    wait_until("both sides encrypted", || {
        chat_state(a, chat_id) == Some(ChatState::Encrypted)
            && chat_state(b, chat_id) == Some(ChatState::Encrypted)
    })
    .await;
    chat_id
}

#[tokio::test]
async fn friend_flow_handshake_and_messaging() {
    let mut a = start_node(LocalIdentity::generate("alice"), Arc::new(MemoryStore::new())).await;
    let b_store = Arc::new(MemoryStore::new());
    let mut b = start_node(LocalIdentity::generate("bob"), b_store.clone()).await;

    let chat_id = befriend(&mut a, &mut b).await;

    let keys_a = a.engine.protocol().cache().get(chat_id).unwrap().keys().cloned();
    let keys_b = b.engine.protocol().cache().get(chat_id).unwrap().keys().cloned();
    assert!(keys_a.is_some());
    assert_eq!(keys_a, keys_b);

    let sent = a.engine.protocol().send_message(chat_id, "hello bob").await.unwrap();
    let envelope = relay(&mut a, &b).await;
    match &envelope {
        StreamPayload::Envelope(e) => assert!(!e.ciphertext.windows(5).any(|w| w == b"hello")),
        other => panic!("expected envelope, got {other:?}"),
    }

    timeout(WAIT, async {
        while b_store.get_messages(chat_id).await.unwrap().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for stored message");
    let received = b.engine.protocol().messages(chat_id).await.unwrap();
    assert_eq!(received[0].id, sent.id);
    assert_eq!(received[0].plaintext, "hello bob");
    assert_eq!(received[0].direction, Direction::Incoming);
    assert_eq!(received[0].from_id, a.user_id);

    a.engine.shutdown().await;
    b.engine.shutdown().await;
}

#[tokio::test]
async fn repeat_confirmation_sends_nothing() {
    let mut a = start_node(LocalIdentity::generate("alice"), Arc::new(MemoryStore::new())).await;
    let mut b = start_node(LocalIdentity::generate("bob"), Arc::new(MemoryStore::new())).await;
    let chat_id = befriend(&mut a, &mut b).await;

    let duplicate = StreamPayload::KeyExchangeConfirmation(KeyExchangeConfirmation {
        chat_id,
        success: true,
        confirmer_id: a.user_id,
        target_id: b.user_id,
    });
    b.engine.dispatch(duplicate.clone());
    b.engine.dispatch(duplicate);

    assert!(timeout(Duration::from_millis(200), b.outbox.recv()).await.is_err());
    assert_eq!(chat_state(&b, chat_id), Some(ChatState::Encrypted));

    a.engine.shutdown().await;
    b.engine.shutdown().await;
}

#[tokio::test]
async fn store_failures_do_not_stall_the_handshake() {
    let mut a = start_node(LocalIdentity::generate("alice"), Arc::new(MemoryStore::new())).await;
    let b_store = Arc::new(MemoryStore::new());
    let mut b = start_node(LocalIdentity::generate("bob"), b_store.clone()).await;

    a.engine.protocol().send_friend_request(b.user_id).await.unwrap();
    relay(&mut a, &b).await;
    wait_until("friend request", || {
        !b.engine.protocol().pending_friend_requests().is_empty()
    })
    .await;
    let invite = b.engine.protocol().pending_friend_requests()[0].invite_id;
    b.engine.protocol().respond_friend_request(invite, true).await.unwrap();
    relay(&mut b, &a).await;

    b_store.set_fail_writes(true);
    let request = relay(&mut a, &b).await;
    let chat_id = match request {
        StreamPayload::KeyExchangeRequest(r) => r.chat_id,
        other => panic!("expected key exchange request, got {other:?}"),
    };
    relay(&mut b, &a).await;
    relay(&mut a, &b).await;
    relay(&mut b, &a).await;

    wait_until("responder encrypted", || {
        chat_state(&b, chat_id) == Some(ChatState::Encrypted)
    })
    .await;
    assert!(b_store.get_chats().await.unwrap().is_empty());

    a.engine.shutdown().await;
    b.engine.shutdown().await;
}

#[tokio::test]
async fn encrypted_chat_survives_restart_with_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("bob.db");

    let bob_id = Uuid::new_v4();
    let signing = IdentityKeyPair::generate();
    let encryption = EncryptionKeyPair::generate();
    let signing_secret = *signing.secret_bytes();
    let encryption_secret = encryption.secret_bytes();

    let mut a = start_node(LocalIdentity::generate("alice"), Arc::new(MemoryStore::new())).await;
    let store = SqliteStore::open_with_password(&db_path, b"bob's password").await.unwrap();
    let mut b = start_node(
        LocalIdentity::new(bob_id, "bob", signing, encryption),
        Arc::new(store.clone()),
    )
    .await;

    let chat_id = befriend(&mut a, &mut b).await;
    timeout(WAIT, async {
        loop {
            let chats = store.get_chats().await.unwrap();
            if chats.iter().any(|c| c.id == chat_id && c.state == ChatState::Encrypted) {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for encrypted state on disk");
    b.engine.shutdown().await;
    store.pool.close().await;

    let reopened = SqliteStore::open_with_password(&db_path, b"bob's password").await.unwrap();
    let restored = start_node(
        LocalIdentity::new(
            bob_id,
            "bob",
            IdentityKeyPair::from_bytes(&signing_secret).unwrap(),
            EncryptionKeyPair::from_bytes(&encryption_secret).unwrap(),
        ),
        Arc::new(reopened),
    )
    .await;

    let chat = restored.engine.protocol().cache().get(chat_id).expect("chat restored");
    assert!(chat.is_encrypted());
    assert_eq!(
        chat.keys().cloned(),
        a.engine.protocol().cache().get(chat_id).unwrap().keys().cloned()
    );

    a.engine.shutdown().await;
    restored.engine.shutdown().await;
}

#[tokio::test]
async fn malformed_and_unknown_frames_are_discarded() {
    let node = start_node(LocalIdentity::generate("carol"), Arc::new(MemoryStore::new())).await;

    assert_eq!(node.engine.dispatch_frame(b"{\"type\":"), DispatchOutcome::Undecodable);
    assert_eq!(
        node.engine.dispatch_frame(br#"{"type":"read_receipt","id":"x"}"#),
        DispatchOutcome::Unknown
    );
    assert_eq!(node.engine.demux().dropped_total(), 0);
    assert_eq!(
        node.engine.pool(PayloadKind::Envelope).map(|p| p.worker_count()),
        Some(1)
    );

    node.engine.shutdown().await;
}
