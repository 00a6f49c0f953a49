//! Remote chat API
//!
//! [`ChatApi`] is the contract the offline store depends on. It is
//! implemented over HTTP by [`OpenWebUiClient`] and in-process by
//! [`FakeChatApi`].

pub mod client;
pub mod fake;
pub mod types;
pub mod websocket;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use client::OpenWebUiClient;
pub use fake::FakeChatApi;
pub use types::{
    now_seconds, seconds_to_datetime, ChatCompletionRequest, ChatCompletionResponse, ChatData,
    ChatForm, ChatHistory, ChatMeta, ChatOptions, ChatResponse, ChatSummary, CompletionMessage,
    FileInfo, FileMetadata, FileRef, FileUploadResponse, Message, ModelInfo, Role,
    SignInRequest, SignInResponse,
};
pub use websocket::{parse_stream_chunk, ChatSocket, ChatStreamRequest, SocketEvent};

/// Generation settings applied to outgoing completion requests
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Operations the offline store needs from the server
///
/// Every failure is reported as a remote `ChatDroidError` (see
/// [`ChatDroidError::is_remote`](crate::error::ChatDroidError::is_remote)).
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// List the user's active chats
    async fn fetch_chats(&self) -> StoreResult<Vec<ChatSummary>>;

    /// Fetch a full chat including its message tree
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::NotFound` when the server has no such chat.
    async fn get_chat(&self, chat_id: &str) -> StoreResult<ChatResponse>;

    /// Create an empty chat with the given title
    async fn create_chat(&self, title: &str) -> StoreResult<ChatResponse>;

    /// Delete a chat; `Ok(false)` means the server declined
    async fn delete_chat(&self, chat_id: &str) -> StoreResult<bool>;

    /// Send user text and return the assistant's reply
    async fn send_message(&self, chat_id: &str, content: &str) -> StoreResult<String>;

    /// Server-side title search
    async fn search_chats(&self, text: &str) -> StoreResult<Vec<ChatSummary>>;

    /// Flip the pinned flag and return the updated chat
    async fn toggle_pin_chat(&self, chat_id: &str) -> StoreResult<ChatResponse>;

    /// Flip the archived flag and return the updated chat
    async fn toggle_archive_chat(&self, chat_id: &str) -> StoreResult<ChatResponse>;

    /// Models available to the user
    async fn list_models(&self) -> StoreResult<Vec<ModelInfo>>;
}
