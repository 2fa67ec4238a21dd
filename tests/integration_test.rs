//! End-to-end tests exercising the Collaboration Hub's core across
//! component boundaries: Session Service authorization gating the File
//! Store and Room Registry, and the Room lane wiring a CRDT document to
//! the Persistence Worker (spec §8 scenarios S1, S4, S6).

use collabhub::auth::Principal;
use collabhub::file_store::FileStore;
use collabhub::rooms::RoomRegistry;
use collabhub::session_service::model::{Role, SessionSettings};
use collabhub::session_service::SessionService;
use std::time::Duration;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, StateVector, Text, Transact, Update};

fn principal(user_id: &str, email: &str) -> Principal {
    Principal {
        user_id: user_id.to_string(),
        email: email.to_string(),
        display_name: user_id.to_string(),
    }
}

/// Builds a full-state update that a peer forked from `base_update` would
/// produce after inserting `text` at `position` — exercises the same
/// "apply a remote peer's encoded update" path the Transport layer uses
/// for an incoming `DocUpdate` frame, without reaching into
/// `CrdtDocument`'s private `yrs::Doc`.
fn peer_insert_update(base_update: &[u8], position: u32, text: &str) -> Vec<u8> {
    let doc = Doc::new();
    let content = doc.get_or_insert_text("content");
    {
        let mut txn = doc.transact_mut();
        let update = Update::decode_v1(base_update).unwrap();
        txn.apply_update(update).unwrap();
    }
    {
        let mut txn = doc.transact_mut();
        content.insert(&mut txn, position, text);
    }
    let txn = doc.transact();
    txn.encode_state_as_update_v1(&StateVector::default())
}

/// S1 — create, invite, join, edit, persist: a room seeded from the File
/// Store, edited through the CRDT document, flushes back to identical text.
#[tokio::test]
async fn create_invite_join_edit_persist() {
    let sessions = SessionService::new(":memory:").await.unwrap();
    let files = FileStore::new(
        ":memory:",
        64 * 1024,
        vec![".js".into(), ".py".into(), ".java".into(), ".zip".into()],
        50 * 1024 * 1024,
    )
    .await
    .unwrap();
    let rooms = RoomRegistry::new(files.clone(), Duration::from_secs(7200), Duration::from_millis(20), Duration::from_millis(100));

    let alice = principal("u-alice", "alice@example.com");
    let bob = principal("u-bob", "bob@example.com");

    let mut settings = SessionSettings::default();
    settings.max_participants = 5;
    let session = sessions
        .create_session(&alice, "demo", "", settings)
        .await
        .unwrap();

    files
        .put_file(&session.session_id, "main.js", b"hello".to_vec(), "application/javascript", "u-alice")
        .await
        .unwrap();

    sessions
        .invite_participant(&alice, &session.session_id, "bob@example.com", Role::Editor)
        .await
        .unwrap();
    sessions.accept_invitation(&bob, &session.session_id).await.unwrap();

    let decision = sessions.authorize(&bob, &session.session_id, Role::Editor).await;
    assert!(decision.allow);
    assert_eq!(decision.effective_role, Some(Role::Editor));

    let room = rooms.acquire(&session.session_id, "main.js").await.unwrap();
    assert_eq!(room.lock().await.document.to_text(), "hello");

    {
        let mut state = room.lock().await;
        let base = state.document.encode_full();
        let update = peer_insert_update(&base, 5, ", world");
        state.document.apply(&update).unwrap();
        state.dirty = true;
    }
    assert_eq!(room.lock().await.document.to_text(), "hello, world");

    room.notify_dirty("u-alice".to_string());
    tokio::time::sleep(Duration::from_millis(250)).await;

    let persisted = files.get_text(&session.session_id, "main.js").await.unwrap();
    assert_eq!(persisted, "hello, world");
}

/// S2 — permission revocation mid-session drops authorization immediately
/// (modulo the authz cache), and the removed participant can no longer act.
#[tokio::test]
async fn permission_revocation_blocks_further_access() {
    let sessions = SessionService::new(":memory:").await.unwrap();
    let alice = principal("u-alice", "alice@example.com");
    let bob = principal("u-bob", "bob@example.com");

    let mut settings = SessionSettings::default();
    settings.max_participants = 5;
    let session = sessions
        .create_session(&alice, "demo", "", settings)
        .await
        .unwrap();

    sessions
        .invite_participant(&alice, &session.session_id, "bob@example.com", Role::Editor)
        .await
        .unwrap();
    sessions.accept_invitation(&bob, &session.session_id).await.unwrap();
    assert!(sessions.authorize(&bob, &session.session_id, Role::Viewer).await.allow);

    sessions
        .remove_participant(&alice, &session.session_id, "u-bob")
        .await
        .unwrap();

    let decision = sessions.authorize(&bob, &session.session_id, Role::Viewer).await;
    assert!(!decision.allow);
}

/// S6 — releasing every subscriber and purging the room flushes dirty
/// state, and re-acquiring seeds from the latest File Store content.
#[tokio::test]
async fn room_purge_flushes_then_reseeds() {
    let files = FileStore::new(":memory:", 64 * 1024, vec![".py".into()], 50 * 1024 * 1024)
        .await
        .unwrap();
    let rooms = RoomRegistry::new(files.clone(), Duration::from_secs(7200), Duration::from_secs(60), Duration::from_secs(60));

    files
        .put_file("s1", "a.py", b"one".to_vec(), "text/x-python", "u1")
        .await
        .unwrap();

    let room = rooms.acquire("s1", "a.py").await.unwrap();
    {
        let mut state = room.lock().await;
        let base = state.document.encode_full();
        let update = peer_insert_update(&base, 3, " two");
        state.document.apply(&update).unwrap();
        state.dirty = true;
    }

    rooms.purge("s1", "a.py").await;
    assert_eq!(files.get_text("s1", "a.py").await.unwrap(), "one two");

    let room = rooms.acquire("s1", "a.py").await.unwrap();
    assert_eq!(room.lock().await.document.to_text(), "one two");
}
