//! In-process fake of the chat API for tests
//!
//! [`FakeChatApi`] keeps chats in memory and implements [`ChatApi`] without
//! any network I/O. Tests can take it offline, add latency, and inspect how
//! often each operation was called.
//!
//! # Example
//!
//! ```
//! use chatdroid::api::{ChatApi, FakeChatApi};
//!
//! # tokio_test::block_on(async {
//! let api = FakeChatApi::new();
//! let chat = api.create_chat("Plans").await.unwrap();
//! assert_eq!(api.fetch_chats().await.unwrap()[0].id, chat.id);
//!
//! api.set_offline(true);
//! assert!(api.fetch_chats().await.is_err());
//! assert_eq!(api.call_count("fetch_chats"), 2);
//! # })
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{
    now_seconds, ChatData, ChatHistory, ChatResponse, ChatSummary, Message, ModelInfo, Role,
};
use super::ChatApi;
use crate::error::{ChatDroidError, StoreResult};

/// Build a chat whose history is a single linear thread
///
/// Messages alternate user/assistant starting with user, get ids
/// `{chat_id}-m0`, `{chat_id}-m1`, ... and timestamps 1, 2, ...
pub fn chat_with_thread(chat_id: &str, title: &str, contents: &[&str]) -> ChatResponse {
    let mut messages = HashMap::new();
    let mut parent: Option<String> = None;
    for (i, content) in contents.iter().enumerate() {
        let id = format!("{}-m{}", chat_id, i);
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        let message = Message::new(id.clone(), parent.as_deref(), role, *content, i as i64 + 1);
        messages.insert(id.clone(), message);
        parent = Some(id);
    }

    ChatResponse {
        id: chat_id.to_string(),
        user_id: "fake-user".to_string(),
        title: title.to_string(),
        chat: ChatData {
            history: ChatHistory {
                current_id: parent,
                messages,
            },
            models: vec!["fake-model".to_string()],
            title: Some(title.to_string()),
            ..Default::default()
        },
        updated_at: contents.len() as i64,
        created_at: 0,
        share_id: None,
        archived: false,
        pinned: false,
        meta: Default::default(),
        folder_id: None,
    }
}

/// In-memory [`ChatApi`] implementation
#[derive(Debug, Default)]
pub struct FakeChatApi {
    chats: Mutex<HashMap<String, ChatResponse>>,
    models: Mutex<Vec<ModelInfo>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    offline: AtomicBool,
    fail_sends: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a chat
    pub fn insert_chat(&self, chat: ChatResponse) {
        if let Ok(mut chats) = self.chats.lock() {
            chats.insert(chat.id.clone(), chat);
        }
    }

    /// Current server-side copy of a chat
    pub fn chat(&self, chat_id: &str) -> Option<ChatResponse> {
        self.chats.lock().ok().and_then(|c| c.get(chat_id).cloned())
    }

    pub fn set_models(&self, models: Vec<ModelInfo>) {
        if let Ok(mut guard) = self.models.lock() {
            *guard = models;
        }
    }

    /// Make every call fail with a network error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only `send_message` fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// How many times `operation` (a `ChatApi` method name) was called
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(operation).copied())
            .unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str) -> StoreResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(operation).or_insert(0) += 1;
        }
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChatDroidError::Network(format!(
                "{}: connection refused",
                operation
            )));
        }
        Ok(())
    }

    fn with_chat<T>(
        &self,
        chat_id: &str,
        f: impl FnOnce(&mut ChatResponse) -> T,
    ) -> StoreResult<T> {
        let mut chats = self
            .chats
            .lock()
            .map_err(|_| ChatDroidError::Network("fake state poisoned".to_string()))?;
        chats
            .get_mut(chat_id)
            .map(f)
            .ok_or_else(|| ChatDroidError::NotFound(format!("chat {}", chat_id)))
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn fetch_chats(&self) -> StoreResult<Vec<ChatSummary>> {
        self.enter("fetch_chats").await?;
        let chats = self
            .chats
            .lock()
            .map_err(|_| ChatDroidError::Network("fake state poisoned".to_string()))?;
        let mut summaries: Vec<ChatSummary> = chats
            .values()
            .filter(|c| !c.archived)
            .map(ChatResponse::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        self.enter("get_chat").await?;
        self.with_chat(chat_id, |chat| chat.clone())
    }

    async fn create_chat(&self, title: &str) -> StoreResult<ChatResponse> {
        self.enter("create_chat").await?;
        let now = now_seconds();
        let mut chat = chat_with_thread(&uuid::Uuid::new_v4().to_string(), title, &[]);
        chat.created_at = now;
        chat.updated_at = now;
        self.insert_chat(chat.clone());
        Ok(chat)
    }

    async fn delete_chat(&self, chat_id: &str) -> StoreResult<bool> {
        self.enter("delete_chat").await?;
        let mut chats = self
            .chats
            .lock()
            .map_err(|_| ChatDroidError::Network("fake state poisoned".to_string()))?;
        Ok(chats.remove(chat_id).is_some())
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> StoreResult<String> {
        self.enter("send_message").await?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChatDroidError::Status {
                status: 500,
                body: "completion failed".to_string(),
            });
        }

        let reply = format!("echo: {}", content);
        let stored_reply = reply.clone();
        let content = content.to_string();
        self.with_chat(chat_id, move |chat| {
            let now = now_seconds();
            let history = &mut chat.chat.history;
            let parent = history.current_id.clone();
            let user_id = uuid::Uuid::new_v4().to_string();
            let reply_id = uuid::Uuid::new_v4().to_string();

            let user = Message::new(user_id.clone(), parent.as_deref(), Role::User, content, now);
            let mut assistant = Message::new(
                reply_id.clone(),
                Some(&user_id),
                Role::Assistant,
                stored_reply,
                now,
            );
            assistant.model = chat.chat.models.first().cloned();

            if let Some(parent) = parent.as_ref().and_then(|p| history.messages.get_mut(p)) {
                parent.children_ids.push(user_id.clone());
            }
            history.messages.insert(user_id, user);
            history.messages.insert(reply_id.clone(), assistant);
            history.current_id = Some(reply_id);
            chat.updated_at = now;
        })?;

        Ok(reply)
    }

    async fn search_chats(&self, text: &str) -> StoreResult<Vec<ChatSummary>> {
        self.enter("search_chats").await?;
        let needle = text.to_lowercase();
        let chats = self
            .chats
            .lock()
            .map_err(|_| ChatDroidError::Network("fake state poisoned".to_string()))?;
        Ok(chats
            .values()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .map(ChatResponse::summary)
            .collect())
    }

    async fn toggle_pin_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        self.enter("toggle_pin_chat").await?;
        self.with_chat(chat_id, |chat| {
            chat.pinned = !chat.pinned;
            chat.clone()
        })
    }

    async fn toggle_archive_chat(&self, chat_id: &str) -> StoreResult<ChatResponse> {
        self.enter("toggle_archive_chat").await?;
        self.with_chat(chat_id, |chat| {
            chat.archived = !chat.archived;
            chat.clone()
        })
    }

    async fn list_models(&self) -> StoreResult<Vec<ModelInfo>> {
        self.enter("list_models").await?;
        Ok(self.models.lock().map(|m| m.clone()).unwrap_or_default())
    }
}
