//! Offline-first chat store
//!
//! Reads are served from the local cache and refreshed once from the server
//! per subscription. Writes land in the cache first and are mirrored to the
//! server; remote failures never lose local state.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::api::{now_seconds, ChatApi, Message, Role};
use crate::config::DEFAULT_CHAT_TITLE;
use crate::error::{ChatDroidError, StoreResult};
use crate::storage::{
    CacheEvent, CacheStats, CachedAttachment, CachedChat, CachedMessage, ChatCache,
    ChatListEntry, MessageStatus,
};

const LIVE_BUFFER: usize = 16;

/// Cache-backed view of the user's chats
///
/// Cloning is cheap; clones share the API handle and the cache.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chatdroid::api::FakeChatApi;
/// use chatdroid::repository::OfflineChatStore;
/// use chatdroid::storage::ChatCache;
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir().unwrap();
/// let cache = ChatCache::new_with_path(dir.path().join("cache.db")).unwrap();
/// let store = OfflineChatStore::new(Arc::new(FakeChatApi::new()), cache);
///
/// let chat = store.create_chat(Some("Ideas")).await.unwrap();
/// assert_eq!(store.search_chats("idea").await.unwrap()[0].id, chat.id);
/// # })
/// ```
#[derive(Clone)]
pub struct OfflineChatStore {
    api: Arc<dyn ChatApi>,
    cache: ChatCache,
    default_title: String,
}

impl std::fmt::Debug for OfflineChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineChatStore")
            .field("cache", &self.cache)
            .field("default_title", &self.default_title)
            .finish_non_exhaustive()
    }
}

impl OfflineChatStore {
    pub fn new(api: Arc<dyn ChatApi>, cache: ChatCache) -> Self {
        Self {
            api,
            cache,
            default_title: DEFAULT_CHAT_TITLE.to_string(),
        }
    }

    /// Title used by [`create_chat`](Self::create_chat) when none is given
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    pub fn cache(&self) -> &ChatCache {
        &self.cache
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChatCache) -> StoreResult<T> + Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| ChatDroidError::Storage(format!("Cache task failed: {}", e)))?
    }

    /// Live list of active chats
    ///
    /// Emits the cached list first, then re-emits whenever the cache changes,
    /// including once after a single background refresh from the server.
    /// Refresh failures are logged and the stream keeps serving cache data.
    /// Dropping the stream stops the background task and any refresh in
    /// flight.
    pub fn chats(&self) -> ReceiverStream<Vec<ChatListEntry>> {
        let (tx, rx) = mpsc::channel(LIVE_BUFFER);
        let store = self.clone();
        tokio::spawn(async move {
            let events = store.cache.subscribe();
            store
                .drive_live(
                    tx,
                    events,
                    |_| true,
                    |cache| cache.active_chats(),
                    store.refresh_chats(),
                    "chat list",
                )
                .await;
        });
        ReceiverStream::new(rx)
    }

    /// Live messages of one chat in cached (timestamp) order
    ///
    /// Same contract as [`chats`](Self::chats): cache first, one refresh of
    /// the chat snapshot, re-emission on every change to this chat.
    pub fn messages_for_chat(&self, chat_id: &str) -> ReceiverStream<Vec<CachedMessage>> {
        let (tx, rx) = mpsc::channel(LIVE_BUFFER);
        let store = self.clone();
        let chat_id = chat_id.to_string();
        tokio::spawn(async move {
            let events = store.cache.subscribe();
            let query_id = chat_id.clone();
            let filter_id = chat_id.clone();
            store
                .drive_live(
                    tx,
                    events,
                    move |event| event.affects_messages_of(&filter_id),
                    move |cache| cache.messages_for_chat(&query_id),
                    async {
                        store.refresh_messages(&chat_id).await.map(|_| ())
                    },
                    "messages",
                )
                .await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive_live<T, R, Q, F>(
        &self,
        tx: mpsc::Sender<T>,
        mut events: broadcast::Receiver<CacheEvent>,
        relevant: impl Fn(&CacheEvent) -> bool,
        query: Q,
        refresh: F,
        label: &'static str,
    ) where
        T: PartialEq + Clone + Send + 'static,
        Q: Fn(&ChatCache) -> StoreResult<T> + Clone + Send + 'static,
        F: std::future::Future<Output = StoreResult<R>>,
    {
        let mut last: Option<T> = None;

        match self.blocking(query.clone()).await {
            Ok(rows) => {
                if tx.send(rows.clone()).await.is_err() {
                    return;
                }
                last = Some(rows);
            }
            Err(e) => tracing::warn!("Failed to read cached {}: {}", label, e),
        }

        tokio::pin!(refresh);
        let mut refreshing = true;

        loop {
            let requery = tokio::select! {
                _ = tx.closed() => break,
                result = &mut refresh, if refreshing => {
                    refreshing = false;
                    if let Err(e) = result {
                        tracing::warn!("Background refresh of {} failed: {}", label, e);
                    }
                    false
                }
                event = events.recv() => match event {
                    Ok(event) => relevant(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Live {} lagged by {} events", label, skipped);
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if !requery {
                continue;
            }

            match self.blocking(query.clone()).await {
                Ok(rows) => {
                    if last.as_ref() == Some(&rows) {
                        continue;
                    }
                    if tx.send(rows.clone()).await.is_err() {
                        break;
                    }
                    last = Some(rows);
                }
                Err(e) => tracing::warn!("Failed to re-read cached {}: {}", label, e),
            }
        }

        tracing::debug!("Live {} stream closed", label);
    }

    /// Fetch the chat list once and upsert it into the cache
    ///
    /// Returns how many chats the server reported.
    pub async fn refresh_chats(&self) -> StoreResult<usize> {
        let summaries = self.api.fetch_chats().await?;
        let count = summaries.len();
        self.blocking(move |cache| cache.upsert_chat_summaries(&summaries))
            .await?;
        tracing::debug!("Refreshed {} chats", count);
        Ok(count)
    }

    /// Fetch one chat, rebuild its thread and store chat, messages and
    /// attachments in one batch
    ///
    /// Returns the thread in conversation order.
    pub async fn refresh_messages(&self, chat_id: &str) -> StoreResult<Vec<Message>> {
        let chat = self.api.get_chat(chat_id).await?;
        let thread = chat.thread();
        let stored = thread.clone();
        self.blocking(move |cache| cache.apply_chat_snapshot(&chat, &stored))
            .await?;
        tracing::debug!("Refreshed chat {} with {} messages", chat_id, thread.len());
        Ok(thread)
    }

    /// One-shot read of the cached chat list
    pub async fn cached_chats(&self) -> StoreResult<Vec<ChatListEntry>> {
        self.blocking(|cache| cache.active_chats()).await
    }

    /// One-shot read of a chat's cached messages
    pub async fn cached_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        let chat_id = chat_id.to_string();
        self.blocking(move |cache| cache.messages_for_chat(&chat_id))
            .await
    }

    pub async fn cached_chat(&self, chat_id: &str) -> StoreResult<Option<CachedChat>> {
        let chat_id = chat_id.to_string();
        self.blocking(move |cache| cache.get_chat(&chat_id)).await
    }

    pub async fn attachments(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> StoreResult<Vec<CachedAttachment>> {
        let chat_id = chat_id.to_string();
        let message_id = message_id.to_string();
        self.blocking(move |cache| cache.attachments_for_message(&chat_id, &message_id))
            .await
    }

    /// Send user text to a chat
    ///
    /// The message is cached as `pending` before any network call. Its parent
    /// is the chat's newest cached message that did not fail. On success it
    /// becomes `sent` and the reply is returned; on failure it becomes
    /// `failed`, stays cached, and the remote error is returned.
    pub async fn send_message(&self, chat_id: &str, content: &str) -> StoreResult<String> {
        let now = now_seconds();
        let message_id = uuid::Uuid::new_v4().to_string();
        let placeholder_title = self.default_title.clone();

        let pending = {
            let chat_id = chat_id.to_string();
            let content = content.to_string();
            let message_id = message_id.clone();
            self.blocking(move |cache| {
                if cache.get_chat(&chat_id)?.is_none() {
                    cache.upsert_chat(&CachedChat::local(chat_id.clone(), placeholder_title, now))?;
                }
                let parent = cache.latest_message(&chat_id)?.map(|m| m.id);
                let message = CachedMessage::from_message(
                    &chat_id,
                    &Message::new(message_id, parent.as_deref(), Role::User, content, now),
                    MessageStatus::Pending,
                );
                cache.upsert_message(&message)?;
                Ok(message)
            })
            .await?
        };

        tracing::debug!("Cached pending message {} for chat {}", pending.id, chat_id);

        match self.api.send_message(chat_id, content).await {
            Ok(reply) => {
                if let Err(e) = self.mark(chat_id, &message_id, MessageStatus::Sent).await {
                    tracing::warn!("Failed to mark message {} as sent: {}", message_id, e);
                }
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!("Send to chat {} failed, keeping message {}: {}", chat_id, message_id, e);
                if let Err(mark_err) = self.mark(chat_id, &message_id, MessageStatus::Failed).await
                {
                    tracing::warn!("Failed to mark message {} as failed: {}", message_id, mark_err);
                }
                Err(e)
            }
        }
    }

    async fn mark(&self, chat_id: &str, message_id: &str, status: MessageStatus) -> StoreResult<bool> {
        let chat_id = chat_id.to_string();
        let message_id = message_id.to_string();
        self.blocking(move |cache| cache.set_message_status(&chat_id, &message_id, status))
            .await
    }

    /// Create a chat on the server and cache it
    ///
    /// # Errors
    ///
    /// When the server cannot be reached a local-only chat is cached and
    /// `ChatDroidError::OfflineFallback` carries its id and the remote
    /// failure.
    pub async fn create_chat(&self, title: Option<&str>) -> StoreResult<CachedChat> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.default_title)
            .to_string();

        match self.api.create_chat(&title).await {
            Ok(chat) => {
                let row = CachedChat::from(&chat);
                let stored = row.clone();
                self.blocking(move |cache| cache.upsert_chat(&stored)).await?;
                Ok(row)
            }
            Err(e) if e.is_remote() => {
                let local_id = uuid::Uuid::new_v4().to_string();
                tracing::warn!("Create chat failed remotely, caching local chat {}: {}", local_id, e);
                let row = CachedChat::local(local_id.clone(), title, now_seconds());
                self.blocking(move |cache| cache.upsert_chat(&row)).await?;
                Err(ChatDroidError::OfflineFallback {
                    local_id,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Delete a chat locally, then on the server
    ///
    /// Returns `Ok(true)` once the local delete succeeds; remote failures
    /// are logged and ignored.
    pub async fn delete_chat(&self, chat_id: &str) -> StoreResult<bool> {
        let id = chat_id.to_string();
        let removed = self.blocking(move |cache| cache.delete_chat(&id)).await?;
        if !removed {
            tracing::debug!("Chat {} was not cached", chat_id);
        }

        match self.api.delete_chat(chat_id).await {
            Ok(true) => tracing::debug!("Deleted chat {} on server", chat_id),
            Ok(false) => tracing::warn!("Server declined to delete chat {}", chat_id),
            Err(e) => tracing::warn!("Remote delete of chat {} failed: {}", chat_id, e),
        }

        Ok(true)
    }

    /// Case-insensitive title search over the cache only
    pub async fn search_chats(&self, query: &str) -> StoreResult<Vec<CachedChat>> {
        let query = query.to_string();
        self.blocking(move |cache| cache.search_chats(&query)).await
    }

    /// Flip the pinned flag locally, then mirror it on the server
    pub async fn toggle_pin(&self, chat_id: &str) -> StoreResult<CachedChat> {
        self.toggle(chat_id, Flag::Pinned).await
    }

    /// Flip the archived flag locally, then mirror it on the server
    pub async fn toggle_archive(&self, chat_id: &str) -> StoreResult<CachedChat> {
        self.toggle(chat_id, Flag::Archived).await
    }

    async fn toggle(&self, chat_id: &str, flag: Flag) -> StoreResult<CachedChat> {
        let id = chat_id.to_string();
        let flipped = self
            .blocking(move |cache| match flag {
                Flag::Pinned => cache.toggle_pinned(&id),
                Flag::Archived => cache.toggle_archived(&id),
            })
            .await?;
        if flipped.is_none() {
            return Err(ChatDroidError::NotFound(format!("chat {}", chat_id)));
        }

        let remote = match flag {
            Flag::Pinned => self.api.toggle_pin_chat(chat_id).await,
            Flag::Archived => self.api.toggle_archive_chat(chat_id).await,
        };

        let chat = remote.map_err(|e| {
            tracing::warn!("Remote toggle of chat {} failed, keeping local change: {}", chat_id, e);
            e
        })?;

        let row = CachedChat::from(&chat);
        let stored = row.clone();
        self.blocking(move |cache| cache.upsert_chat(&stored)).await?;
        Ok(row)
    }

    /// Number of cached chats, or 0 if the cache cannot be read
    pub async fn offline_chat_count(&self) -> usize {
        match self.blocking(|cache| cache.count_chats()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Failed to count cached chats: {}", e);
                0
            }
        }
    }

    pub async fn stats(&self) -> StoreResult<CacheStats> {
        self.blocking(|cache| cache.stats()).await
    }

    /// Messages of a chat whose send failed
    pub async fn failed_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        let chat_id = chat_id.to_string();
        self.blocking(move |cache| cache.failed_messages(&chat_id))
            .await
    }

    /// Wipe the local cache
    pub async fn clear_all(&self) -> StoreResult<()> {
        self.blocking(|cache| cache.clear_all()).await?;
        tracing::info!("Cleared local chat cache");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    Pinned,
    Archived,
}
