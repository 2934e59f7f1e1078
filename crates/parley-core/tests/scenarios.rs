//! End-to-end behaviour of the engine over a file-backed store.

use parley_core::{
    collections, Engine, EngineConfig, Error, Message, ServerFrame, Store, Subscription,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

async fn file_engine(dir: &TempDir) -> Engine {
    Engine::open(dir.path(), EngineConfig::default())
        .await
        .unwrap()
}

fn pushed_message(frame: &ServerFrame) -> &Message {
    match frame {
        ServerFrame::NewMessage { message, .. } => message,
        other => panic!("Expected new_message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_two_party_conversation() {
    let dir = TempDir::new().unwrap();
    let engine = file_engine(&dir).await;
    let (_, mut rx) = engine.connect();

    let chat = engine.directory().ensure_chat("alice", "bob").await.unwrap();
    assert_eq!(chat, "alice_bob");

    engine.send_message(&chat, "alice", "hi").await.unwrap();
    engine.send_message(&chat, "bob", "yo").await.unwrap();

    let texts: Vec<_> = engine
        .log()
        .read(&chat)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["hi", "yo"]);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(pushed_message(&first).text, "hi");
    assert_eq!(pushed_message(&second).text, "yo");
}

#[tokio::test]
async fn test_history_keeps_latest_500() {
    let dir = TempDir::new().unwrap();
    let engine = file_engine(&dir).await;

    let mut sent = Vec::new();
    for i in 0..501 {
        sent.push(
            engine
                .log()
                .append("alice_bob", "alice", format!("message {i}"))
                .await
                .unwrap(),
        );
    }

    let history = engine.log().read("alice_bob").await.unwrap();
    assert_eq!(history.len(), 500);
    assert!(!history.contains(&sent[0]));
    assert_eq!(history.last(), sent.last());
    assert_eq!(history[..], sent[1..]);
}

#[tokio::test]
async fn test_subscribe_to_unknown_channel_is_permissive_no_op() {
    let dir = TempDir::new().unwrap();
    let engine = file_engine(&dir).await;

    let outcome = engine.directory().subscribe("ghost", "alice").await.unwrap();
    assert_eq!(outcome, Subscription::NoSuchChannel);

    let channels: Vec<parley_core::Channel> =
        engine.store().read(collections::CHANNELS).await.unwrap();
    assert!(channels.is_empty());
    assert!(engine.directory().list_for("alice").await.unwrap().channels.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_lose_nothing_and_push_in_commit_order() {
    let engine = Arc::new(Engine::in_memory());
    let (_, mut rx) = engine.connect();

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let from = if i % 2 == 0 { "alice" } else { "bob" };
            engine
                .send_message("alice_bob", from, format!("m{i}"))
                .await
                .unwrap()
                .message
        }));
    }

    let mut committed = HashSet::new();
    for handle in handles {
        committed.insert(handle.await.unwrap().id);
    }

    let history = engine.log().read("alice_bob").await.unwrap();
    assert_eq!(history.len(), 100);
    let stored: HashSet<_> = history.iter().map(|m| m.id.clone()).collect();
    assert_eq!(stored, committed);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].log_order(&pair[1]).is_lt()));

    let mut pushed = Vec::new();
    for _ in 0..100 {
        pushed.push(pushed_message(&rx.recv().await.unwrap()).clone());
    }
    assert_eq!(pushed, history);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_respect_bound() {
    let store = Store::in_memory();
    let engine = Arc::new(Engine::new(
        store,
        EngineConfig {
            history_limit: 50,
            ..EngineConfig::default()
        },
    ));

    let mut handles = Vec::new();
    for i in 0..80 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.log().append("room", "alice", format!("m{i}")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = engine.log().read("room").await.unwrap();
    assert_eq!(history.len(), 50);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].log_order(&pair[1]).is_lt()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_channel_creation_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(file_engine(&dir).await);

    let a = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.directory().create_channel("news", "carol").await })
    };
    let b = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.directory().create_channel("NEWS", "dave").await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyExists(_))))
        .count();
    assert_eq!((wins, conflicts), (1, 1));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = file_engine(&dir).await;
        engine.directory().ensure_chat("bob", "alice").await.unwrap();
        engine.send_message("alice_bob", "alice", "hi").await.unwrap();
        engine.presence().mark_online("alice").await.unwrap();
    }

    let engine = file_engine(&dir).await;
    assert_eq!(engine.log().read("alice_bob").await.unwrap()[0].text, "hi");
    assert_eq!(engine.presence().snapshot().await.unwrap().users, vec!["alice"]);
    let listing = engine.directory().list_for("alice").await.unwrap();
    assert_eq!(listing.chats[0].user1, "bob");
}

#[tokio::test]
async fn test_corrupt_collection_is_not_reset() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("online.json"), b"[\"alice\",").unwrap();
    let engine = file_engine(&dir).await;

    assert!(matches!(
        engine.presence().snapshot().await,
        Err(Error::IntegrityError { .. })
    ));
    assert!(matches!(
        engine.presence().mark_online("bob").await,
        Err(Error::IntegrityError { .. })
    ));

    let raw = std::fs::read(dir.path().join("online.json")).unwrap();
    assert_eq!(raw, b"[\"alice\",");
}
