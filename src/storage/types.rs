use serde::{Deserialize, Serialize};

use crate::api::{ChatResponse, ChatSummary, FileRef, Message, Role};

/// Delivery state of a cached message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Confirmed by the server (or fetched from it)
    #[default]
    Sent,
    /// Inserted locally, remote send in flight
    Pending,
    /// Remote send failed; kept for the user to see
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Pending => "pending",
            MessageStatus::Failed => "failed",
        }
    }

    /// Parse a stored status, treating unknown values as sent
    pub fn from_db(value: &str) -> Self {
        match value {
            "pending" => MessageStatus::Pending,
            "failed" => MessageStatus::Failed,
            _ => MessageStatus::Sent,
        }
    }
}

/// Chat row as stored in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedChat {
    pub id: String,
    pub title: String,
    /// Seconds since the epoch
    pub created_at: i64,
    /// Seconds since the epoch
    pub updated_at: i64,
    pub archived: bool,
    pub pinned: bool,
    pub models: Vec<String>,
    pub share_id: Option<String>,
    pub folder_id: Option<String>,
}

impl CachedChat {
    /// A chat that exists only on this device
    pub fn local(id: impl Into<String>, title: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            archived: false,
            pinned: false,
            models: Vec::new(),
            share_id: None,
            folder_id: None,
        }
    }
}

impl From<&ChatSummary> for CachedChat {
    fn from(summary: &ChatSummary) -> Self {
        Self {
            id: summary.id.clone(),
            title: summary.title.clone(),
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            archived: summary.archived,
            pinned: summary.pinned,
            models: Vec::new(),
            share_id: None,
            folder_id: None,
        }
    }
}

impl From<&ChatResponse> for CachedChat {
    fn from(chat: &ChatResponse) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            archived: chat.archived,
            pinned: chat.pinned,
            models: chat.chat.models.clone(),
            share_id: chat.share_id.clone(),
            folder_id: chat.folder_id.clone(),
        }
    }
}

/// Message row as stored in the local cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub id: String,
    pub chat_id: String,
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub model: Option<String>,
    /// Seconds since the epoch
    pub timestamp: i64,
    pub status: MessageStatus,
}

impl CachedMessage {
    /// Flatten a server message into a cache row
    pub fn from_message(chat_id: &str, message: &Message, status: MessageStatus) -> Self {
        Self {
            id: message.id.clone(),
            chat_id: chat_id.to_string(),
            parent_id: message.parent_id.clone(),
            role: message.role,
            content: message.content.clone(),
            model: message.model.clone(),
            timestamp: message.timestamp,
            status,
        }
    }

    /// Rebuild a wire message (without children or files)
    pub fn to_message(&self) -> Message {
        let mut message = Message::new(
            self.id.clone(),
            self.parent_id.as_deref(),
            self.role,
            self.content.clone(),
            self.timestamp,
        );
        message.model = self.model.clone();
        message
    }
}

/// Attachment row as stored in the local cache
///
/// Rows are owned by one message of one chat; the same server file referenced
/// from two messages is cached twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAttachment {
    pub id: String,
    pub chat_id: String,
    pub message_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub local_path: Option<String>,
    pub remote_url: Option<String>,
}

impl CachedAttachment {
    /// Map a server file reference onto an attachment row
    ///
    /// References without an id get a stable one derived from the owning
    /// message and their position, so repeated refreshes update in place.
    pub fn from_file_ref(chat_id: &str, message_id: &str, index: usize, file: &FileRef) -> Self {
        let filename = file.name.clone().unwrap_or_else(|| "file".to_string());
        let content_type = file
            .kind
            .clone()
            .unwrap_or_else(|| crate::file_utils::mime_type_for_path(&filename).to_string());

        Self {
            id: file
                .id
                .clone()
                .unwrap_or_else(|| format!("{}:{}", message_id, index)),
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            filename,
            content_type,
            size: file.size.unwrap_or(0),
            local_path: None,
            remote_url: file.url.clone(),
        }
    }
}

/// A row of the cached chat list with derived counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatListEntry {
    pub chat: CachedChat,
    pub message_count: usize,
    /// Timestamp of the newest cached message, if any
    pub last_message_time: Option<i64>,
}

/// Row counts of the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub chats: usize,
    pub messages: usize,
    pub attachments: usize,
    pub failed_messages: usize,
}
