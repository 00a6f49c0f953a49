//! Wire types for the Open WebUI REST API
//!
//! These mirror the JSON shapes exchanged with `/api/v1`. Open-ended server
//! maps (`meta`, `options`, file references) are modelled as explicit
//! optional fields plus an `extra` map that keeps any unmodelled keys.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Current time in whole seconds since the Unix epoch
pub fn now_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Convert a seconds-since-epoch timestamp to a UTC datetime
///
/// Out-of-range values fall back to the epoch.
pub fn seconds_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    #[default]
    User,
    /// Model reply
    Assistant,
    /// System prompt
    System,
}

impl Role {
    /// Wire/database representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Reference to a file attached to a message
///
/// The server stores these as loosely-typed objects; the fields below are
/// the ones the cache understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        rename = "type",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single node in a chat's message tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "now_seconds")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
}

impl Message {
    /// Build a message with no children and no attachments
    ///
    /// # Examples
    ///
    /// ```
    /// use chatdroid::api::{Message, Role};
    ///
    /// let msg = Message::new("m1", Some("m0"), Role::User, "hi", 10);
    /// assert_eq!(msg.parent_id.as_deref(), Some("m0"));
    /// ```
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<&str>,
        role: Role,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            children_ids: Vec::new(),
            role,
            content: content.into(),
            model: None,
            timestamp,
            files: Vec::new(),
        }
    }
}

/// The message tree of a chat plus its active leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    #[serde(default)]
    pub current_id: Option<String>,
    #[serde(default)]
    pub messages: HashMap<String, Message>,
}

/// Known generation options stored on a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Known chat metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of a chat: history graph, models and options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatData {
    #[serde(default)]
    pub history: ChatHistory,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Full chat as returned by `GET chats/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub chat: ChatData,
    pub updated_at: i64,
    pub created_at: i64,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub meta: ChatMeta,
    #[serde(default)]
    pub folder_id: Option<String>,
}

impl ChatResponse {
    /// Linear thread ending at the chat's current message
    pub fn thread(&self) -> Vec<Message> {
        crate::thread::reconstruct_thread(
            &self.chat.history.messages,
            self.chat.history.current_id.as_deref(),
        )
    }

    /// Summary view of this chat
    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            updated_at: self.updated_at,
            created_at: self.created_at,
            archived: self.archived,
            pinned: self.pinned,
        }
    }
}

/// Row of the chat list (`GET chats/`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub updated_at: i64,
    pub created_at: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
}

/// Body of `POST chats/new`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatForm {
    pub chat: ChatData,
}

impl ChatForm {
    /// An empty chat with the given title
    pub fn new_chat(title: &str) -> Self {
        Self {
            chat: ChatData {
                history: ChatHistory::default(),
                title: Some(title.to_string()),
                ..Default::default()
            },
        }
    }
}

/// A role/content pair sent to the completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

/// Body of `POST chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Non-streaming completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Model entry from `GET models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
    #[serde(default)]
    pub info: Option<ModelInfoDetails>,
}

impl ModelInfo {
    /// Description from the model's metadata, if any
    pub fn description(&self) -> Option<&str> {
        self.info
            .as_ref()
            .and_then(|i| i.meta.as_ref())
            .and_then(|m| m.description.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelInfoDetails {
    #[serde(default)]
    pub meta: Option<ModelMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMeta {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// Body of `POST auths/signin`
#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Session returned by `POST auths/signin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInResponse {
    pub token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// File metadata as reported by the files API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub name: String,
}

/// Response of `POST files/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub id: String,
    pub filename: String,
    pub meta: FileMetadata,
}

/// Entry of `GET files/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub meta: FileMetadata,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}
