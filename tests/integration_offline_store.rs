//! Integration tests for the offline-first chat store
//!
//! Runs the store against a temporary SQLite cache and the in-memory fake
//! API, covering live streams, the send status policy and local-first
//! mutations.

mod common;

use std::time::Duration;

use chatdroid::api::fake::chat_with_thread;
use chatdroid::error::ChatDroidError;
use chatdroid::api::{Message, Role};
use chatdroid::storage::{CachedChat, CachedMessage, MessageStatus};
use common::create_store;
use tokio_stream::{Stream, StreamExt};

const WAIT: Duration = Duration::from_secs(5);

async fn next<S, T>(stream: &mut S) -> T
where
    S: Stream<Item = T> + Unpin,
{
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("timed out waiting for emission")
        .expect("stream ended")
}

async fn assert_quiet<S, T>(stream: &mut S)
where
    S: Stream<Item = T> + Unpin,
    T: std::fmt::Debug,
{
    let extra = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(extra.is_err(), "unexpected emission: {:?}", extra);
}

#[tokio::test]
async fn test_chat_list_emits_cache_before_server_data() {
    let (store, api, _tmp) = create_store();
    store
        .cache()
        .upsert_chat(&CachedChat::local("c1", "Cached title", 1))
        .unwrap();
    api.insert_chat(chat_with_thread("c1", "Server title", &["hi", "hello"]));

    let mut chats = store.chats();

    let first = next(&mut chats).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].chat.title, "Cached title");

    let second = next(&mut chats).await;
    assert_eq!(second[0].chat.title, "Server title");
    assert_eq!(api.call_count("fetch_chats"), 1);
}

#[tokio::test]
async fn test_chat_list_serves_cache_when_offline() {
    let (store, api, _tmp) = create_store();
    store
        .cache()
        .upsert_chat(&CachedChat::local("c1", "Offline", 1))
        .unwrap();
    api.set_offline(true);

    let mut chats = store.chats();
    let first = next(&mut chats).await;
    assert_eq!(first[0].chat.title, "Offline");

    assert_quiet(&mut chats).await;
    assert_eq!(api.call_count("fetch_chats"), 1);
}

#[tokio::test]
async fn test_chat_list_follows_later_cache_writes() {
    let (store, api, _tmp) = create_store();
    api.set_offline(true);

    let mut chats = store.chats();
    assert!(next(&mut chats).await.is_empty());

    store
        .cache()
        .upsert_chat(&CachedChat::local("c9", "Added later", 5))
        .unwrap();
    let updated = next(&mut chats).await;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].chat.id, "c9");
}

#[tokio::test]
async fn test_messages_stream_refreshes_thread() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &["q1", "a1", "q2"]));

    let mut messages = store.messages_for_chat("c1");
    assert!(next(&mut messages).await.is_empty());

    let refreshed = next(&mut messages).await;
    let contents: Vec<_> = refreshed.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["q1", "a1", "q2"]);
    assert!(refreshed.iter().all(|m| m.status == MessageStatus::Sent));
    assert_eq!(refreshed[1].parent_id.as_deref(), Some("c1-m0"));
}

#[tokio::test]
async fn test_messages_stream_emits_cache_before_server_thread() {
    let (store, api, _tmp) = create_store();
    store
        .cache()
        .upsert_chat(&CachedChat::local("c1", "Cached", 1))
        .unwrap();
    let seeded = CachedMessage::from_message(
        "c1",
        &Message::new("seeded", None, Role::User, "from cache", 1),
        MessageStatus::Sent,
    );
    store.cache().upsert_message(&seeded).unwrap();
    api.insert_chat(chat_with_thread("c1", "T", &["q1", "a1"]));

    let mut messages = store.messages_for_chat("c1");

    let first = next(&mut messages).await;
    assert_eq!(first, vec![seeded]);

    let refreshed = next(&mut messages).await;
    let contents: Vec<_> = refreshed.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"q1"));
    assert!(contents.contains(&"a1"));
    assert!(contents.contains(&"from cache"));
    assert_eq!(api.call_count("get_chat"), 1);
}

#[tokio::test]
async fn test_refreshing_a_copied_chat_keeps_the_original() {
    let (store, api, _tmp) = create_store();
    let original = chat_with_thread("orig", "Original", &["q1", "a1"]);
    let mut copy = original.clone();
    copy.id = "copy".to_string();
    api.insert_chat(original);
    api.insert_chat(copy);

    store.refresh_messages("orig").await.unwrap();
    store.refresh_messages("copy").await.unwrap();

    assert_eq!(store.cached_messages("orig").await.unwrap().len(), 2);
    assert_eq!(store.cached_messages("copy").await.unwrap().len(), 2);

    store.delete_chat("copy").await.unwrap();

    let kept = store.cached_messages("orig").await.unwrap();
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|m| m.chat_id == "orig"));
}

#[tokio::test]
async fn test_messages_stream_ignores_other_chats() {
    let (store, api, _tmp) = create_store();
    api.set_offline(true);
    store
        .cache()
        .upsert_chat(&CachedChat::local("c1", "One", 1))
        .unwrap();
    store
        .cache()
        .upsert_chat(&CachedChat::local("c2", "Two", 1))
        .unwrap();

    let mut messages = store.messages_for_chat("c1");
    assert!(next(&mut messages).await.is_empty());

    api.set_offline(false);
    api.set_fail_sends(true);
    let _ = store.send_message("c2", "elsewhere").await;
    assert_quiet(&mut messages).await;
}

#[tokio::test]
async fn test_dropping_stream_cancels_refresh() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &["q1", "a1"]));
    api.set_latency(Some(Duration::from_millis(300)));

    let mut messages = store.messages_for_chat("c1");
    assert!(next(&mut messages).await.is_empty());
    drop(messages);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(store.cached_messages("c1").await.unwrap().is_empty());
    assert!(store.cached_chat("c1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_send_message_success_marks_sent_and_chains_parents() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));

    assert_eq!(store.send_message("c1", "one").await.unwrap(), "echo: one");
    assert_eq!(store.send_message("c1", "two").await.unwrap(), "echo: two");

    let cached = store.cached_messages("c1").await.unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|m| m.status == MessageStatus::Sent));
    assert_eq!(cached[0].parent_id, None);
    assert_eq!(cached[1].parent_id.as_deref(), Some(cached[0].id.as_str()));
}

#[tokio::test]
async fn test_failed_send_keeps_message_marked_failed() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));
    api.set_fail_sends(true);

    let err = store.send_message("c1", "lost?").await.unwrap_err();
    assert!(matches!(err, ChatDroidError::Status { status: 500, .. }));

    let failed = store.failed_messages("c1").await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].content, "lost?");
    assert_eq!(store.stats().await.unwrap().failed_messages, 1);
}

#[tokio::test]
async fn test_send_after_failure_chains_to_last_delivered_message() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));

    store.send_message("c1", "one").await.unwrap();
    api.set_fail_sends(true);
    assert!(store.send_message("c1", "lost").await.is_err());
    api.set_fail_sends(false);
    store.send_message("c1", "three").await.unwrap();

    let cached = store.cached_messages("c1").await.unwrap();
    let by_content = |content: &str| {
        cached
            .iter()
            .find(|m| m.content == content)
            .expect("message cached")
            .clone()
    };
    let one = by_content("one");
    let lost = by_content("lost");
    let three = by_content("three");

    assert_eq!(lost.status, MessageStatus::Failed);
    assert_eq!(three.parent_id.as_deref(), Some(one.id.as_str()));
}

#[tokio::test]
async fn test_send_is_cached_as_pending_before_network() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));
    api.set_latency(Some(Duration::from_millis(300)));

    let sender = store.clone();
    let send = tokio::spawn(async move { sender.send_message("c1", "hello").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let cached = store.cached_messages("c1").await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].status, MessageStatus::Pending);

    send.await.unwrap().unwrap();
    let cached = store.cached_messages("c1").await.unwrap();
    assert_eq!(cached[0].status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_create_chat_online_caches_server_chat() {
    let (store, api, _tmp) = create_store();

    let chat = store.create_chat(Some("Plans")).await.unwrap();
    assert_eq!(chat.title, "Plans");
    assert!(api.chat(&chat.id).is_some());
    assert_eq!(store.cached_chat(&chat.id).await.unwrap(), Some(chat));
}

#[tokio::test]
async fn test_create_chat_offline_falls_back_to_local_chat() {
    let (store, api, _tmp) = create_store();
    api.set_offline(true);

    let err = store.create_chat(None).await.unwrap_err();
    let local_id = match err {
        ChatDroidError::OfflineFallback { local_id, reason } => {
            assert!(reason.contains("connection refused"));
            local_id
        }
        other => panic!("expected offline fallback, got {:?}", other),
    };

    let cached = store.cached_chat(&local_id).await.unwrap().unwrap();
    assert_eq!(cached.title, "New Chat");
    assert_eq!(store.offline_chat_count().await, 1);
}

#[tokio::test]
async fn test_delete_chat_is_local_first() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &["q", "a"]));
    store.refresh_messages("c1").await.unwrap();
    api.set_offline(true);

    assert!(store.delete_chat("c1").await.unwrap());
    assert!(store.cached_chat("c1").await.unwrap().is_none());
    assert!(store.cached_messages("c1").await.unwrap().is_empty());
    assert_eq!(api.call_count("delete_chat"), 1);
    assert!(api.chat("c1").is_some());
}

#[tokio::test]
async fn test_search_never_hits_server() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("a", "Rust tips", &[]));
    api.insert_chat(chat_with_thread("b", "Gardening", &[]));
    store.refresh_chats().await.unwrap();

    let found = store.search_chats("RUST").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");
    assert_eq!(api.call_count("search_chats"), 0);
}

#[tokio::test]
async fn test_toggle_pin_mirrors_server_and_keeps_local_flip_on_failure() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));
    store.refresh_chats().await.unwrap();

    let pinned = store.toggle_pin("c1").await.unwrap();
    assert!(pinned.pinned);
    assert!(api.chat("c1").unwrap().pinned);

    api.set_offline(true);
    assert!(store.toggle_pin("c1").await.is_err());
    assert!(!store.cached_chat("c1").await.unwrap().unwrap().pinned);
}

#[tokio::test]
async fn test_toggle_archive_hides_chat_from_list() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &[]));
    store.refresh_chats().await.unwrap();

    let archived = store.toggle_archive("c1").await.unwrap();
    assert!(archived.archived);
    assert!(store.cached_chats().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_toggle_unknown_chat_is_not_found() {
    let (store, api, _tmp) = create_store();
    let err = store.toggle_pin("missing").await.unwrap_err();
    assert!(matches!(err, ChatDroidError::NotFound(_)));
    assert_eq!(api.total_calls(), 0);
}

#[tokio::test]
async fn test_clear_all_empties_cache() {
    let (store, api, _tmp) = create_store();
    api.insert_chat(chat_with_thread("c1", "T", &["q"]));
    store.refresh_messages("c1").await.unwrap();
    assert_eq!(store.offline_chat_count().await, 1);

    store.clear_all().await.unwrap();
    assert_eq!(store.offline_chat_count().await, 0);
    assert_eq!(store.stats().await.unwrap().messages, 0);
}
