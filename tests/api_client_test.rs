//! Integration tests for the Open WebUI HTTP client
//!
//! Runs `OpenWebUiClient`, and the repositories built on it, against a
//! `wiremock` mock server.

mod common;

use std::sync::Arc;

use chatdroid::api::{ChatApi, CompletionSettings, OpenWebUiClient};
use chatdroid::config::ServerConfig;
use chatdroid::error::ChatDroidError;
use chatdroid::preferences::{AuthPreferences, SESSION_FILE};
use chatdroid::repository::{AuthRepository, FileRepository, OfflineChatStore, UploadProgress};
use common::create_temp_cache;
use serde_json::json;
use tokio_stream::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> OpenWebUiClient {
    let config = ServerConfig {
        base_url: format!("{}/api/v1/", server.uri()),
        ..Default::default()
    };
    OpenWebUiClient::new(&config).expect("client")
}

fn chat_json() -> serde_json::Value {
    json!({
        "id": "c1",
        "user_id": "u1",
        "title": "Trip planning",
        "updated_at": 300,
        "created_at": 100,
        "chat": {
            "models": ["llama3"],
            "history": {
                "currentId": "m3",
                "messages": {
                    "m1": {"id": "m1", "parentId": null, "childrenIds": ["m2"], "role": "user", "content": "Where to?", "timestamp": 101},
                    "m2": {"id": "m2", "parentId": "m1", "childrenIds": ["m3", "m2b"], "role": "assistant", "content": "Lisbon", "timestamp": 102},
                    "m2b": {"id": "m2b", "parentId": "m2", "childrenIds": [], "role": "user", "content": "abandoned branch", "timestamp": 103},
                    "m3": {"id": "m3", "parentId": "m2", "childrenIds": [], "role": "user", "content": "Book it", "timestamp": 104,
                           "files": [{"id": "f1", "name": "ticket.pdf", "size": 2048}]}
                }
            }
        }
    })
}

#[tokio::test]
async fn test_fetch_chats_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chats/"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c1", "title": "One", "updated_at": 2, "created_at": 1},
            {"id": "c2", "title": "Two", "updated_at": 3, "created_at": 1, "pinned": true}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.set_token(Some("secret".to_string()));

    let chats = client.fetch_chats().await.unwrap();
    assert_eq!(chats.len(), 2);
    assert!(chats[1].pinned);
}

#[tokio::test]
async fn test_error_status_keeps_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chats/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.fetch_chats().await.unwrap_err();
    match err {
        ChatDroidError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_payload_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).await.list_models().await.unwrap_err();
    assert!(matches!(err, ChatDroidError::Payload(_)));
    assert!(err.is_remote());
}

#[tokio::test]
async fn test_missing_chat_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chats/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server).await.get_chat("nope").await.unwrap_err();
    assert!(matches!(err, ChatDroidError::NotFound(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let config = ServerConfig {
        base_url: "http://127.0.0.1:1/api/v1/".to_string(),
        ..Default::default()
    };
    let client = OpenWebUiClient::new(&config).unwrap();
    let err = client.fetch_chats().await.unwrap_err();
    assert!(matches!(err, ChatDroidError::Network(_)));
}

#[tokio::test]
async fn test_send_message_posts_completion_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "chat_id": "c1",
            "max_tokens": 128,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-1",
            "model": "llama3",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.set_completion_settings(CompletionSettings {
        model: "llama3".to_string(),
        temperature: None,
        max_tokens: Some(128),
    });

    assert_eq!(client.send_message("c1", "hello").await.unwrap(), "hi there");
}

#[tokio::test]
async fn test_completion_without_choices_is_payload_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server).await.send_message("c1", "x").await.unwrap_err();
    assert!(matches!(err, ChatDroidError::Payload(_)));
}

#[tokio::test]
async fn test_search_passes_query_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chats/search"))
        .and(query_param("text", "rust tips"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client_for(&server).await.search_chats("rust tips").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_refresh_caches_active_thread_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chats/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_json()))
        .mount(&server)
        .await;

    let (cache, _tmp) = create_temp_cache();
    let store = OfflineChatStore::new(Arc::new(client_for(&server).await), cache);

    let thread = store.refresh_messages("c1").await.unwrap();
    let ids: Vec<_> = thread.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m2", "m3"]);

    let cached = store.cached_messages("c1").await.unwrap();
    assert_eq!(cached.len(), 3);
    assert!(cached.iter().all(|m| m.id != "m2b"));

    let chat = store.cached_chat("c1").await.unwrap().unwrap();
    assert_eq!(chat.title, "Trip planning");
    assert_eq!(chat.models, ["llama3"]);

    let attachments = store.attachments("c1", "m3").await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].content_type, "application/pdf");
}

#[tokio::test]
async fn test_login_persists_session_and_sets_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auths/signin"))
        .and(body_partial_json(json!({"email": "ada@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "jwt-123",
            "token_type": "Bearer",
            "id": "u1",
            "email": "ada@example.com",
            "name": "Ada",
            "role": "user"
        })))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let client = client_for(&server).await;
    let prefs = Arc::new(AuthPreferences::open(tmp.path().join(SESSION_FILE)).unwrap());
    let auth = AuthRepository::new(client.clone(), prefs.clone());

    let response = auth.login("ada@example.com", "pw").await.unwrap();
    assert_eq!(response.name.as_deref(), Some("Ada"));
    assert_eq!(client.token().as_deref(), Some("jwt-123"));

    let reopened = AuthPreferences::open(tmp.path().join(SESSION_FILE)).unwrap();
    assert_eq!(reopened.get().token.as_deref(), Some("jwt-123"));
    assert_eq!(reopened.get().email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn test_rejected_login_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auths/signin"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let client = client_for(&server).await;
    let prefs = Arc::new(AuthPreferences::open(tmp.path().join(SESSION_FILE)).unwrap());
    let auth = AuthRepository::new(client.clone(), prefs);

    let err = auth.login("ada@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ChatDroidError::Authentication(ref body) if body == "bad credentials"));
    assert!(client.token().is_none());
    assert!(auth.current_token().is_none());
}

#[tokio::test]
async fn test_upload_reports_progress_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1",
            "filename": "notes.txt",
            "meta": {"content_type": "text/plain", "size": 5, "name": "notes.txt"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("notes.txt");
    std::fs::write(&file, "hello").unwrap();

    let files = FileRepository::new(client_for(&server).await);
    let steps: Vec<_> = files.upload(&file).collect().await;

    assert_eq!(steps[0], UploadProgress::Starting);
    assert_eq!(steps[1], UploadProgress::Uploading(0));
    match &steps[2] {
        UploadProgress::Success(response) => assert_eq!(response.id, "f1"),
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(steps.len(), 3);
}

#[tokio::test]
async fn test_upload_server_error_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("a.png");
    std::fs::write(&file, [0u8; 16]).unwrap();

    let steps: Vec<_> = FileRepository::new(client_for(&server).await)
        .upload(&file)
        .collect()
        .await;
    assert!(matches!(steps.last(), Some(UploadProgress::Error(msg)) if msg.contains("413")));
}

#[tokio::test]
async fn test_download_writes_file_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/files/f1/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"file-bytes".to_vec()))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("out").join("f1.bin");

    let files = FileRepository::new(client_for(&server).await);
    let written = tokio_test::assert_ok!(files.download("f1", &dest).await);
    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&dest).unwrap(), b"file-bytes");
}

#[tokio::test]
async fn test_delete_missing_file_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let files = FileRepository::new(client_for(&server).await);
    let err = tokio_test::assert_err!(files.delete("gone").await);
    assert!(matches!(err, ChatDroidError::Status { status: 404, .. }));
}
