//! Local SQLite cache of chats, messages and attachments
//!
//! Every operation opens its own connection, so a [`ChatCache`] is cheap to
//! clone and safe to move into `spawn_blocking`. Writes announce themselves on
//! a broadcast channel, which the offline store uses to drive live streams.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tokio::sync::broadcast;

use crate::api::{ChatResponse, ChatSummary, Message};
use crate::error::{ChatDroidError, StoreResult};

pub mod types;
pub use types::{
    CacheStats, CachedAttachment, CachedChat, CachedMessage, ChatListEntry, MessageStatus,
};

/// Environment variable that overrides the cache database location
pub const DB_ENV_VAR: &str = "CHATDROID_DB";

const EVENT_CAPACITY: usize = 64;

/// Bumped whenever a table key changes; older caches are rebuilt
const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    archived INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    models TEXT NOT NULL DEFAULT '[]',
    share_id TEXT,
    folder_id TEXT
);
CREATE TABLE IF NOT EXISTS messages (
    chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
    id TEXT NOT NULL,
    parent_id TEXT,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    model TEXT,
    timestamp INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'sent',
    PRIMARY KEY (chat_id, id)
);
CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, timestamp);
CREATE TABLE IF NOT EXISTS attachments (
    chat_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    id TEXT NOT NULL,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    local_path TEXT,
    remote_url TEXT,
    PRIMARY KEY (chat_id, message_id, id),
    FOREIGN KEY (chat_id, message_id) REFERENCES messages(chat_id, id) ON DELETE CASCADE
);
";

const LEGACY_TABLES: &str = "
DROP TABLE IF EXISTS attachments;
DROP TABLE IF EXISTS messages;
";

const CHAT_COLUMNS: &str =
    "c.id, c.title, c.created_at, c.updated_at, c.archived, c.pinned, c.models, c.share_id, c.folder_id";

const MESSAGE_COLUMNS: &str = "id, chat_id, parent_id, role, content, model, timestamp, status";

/// Change notification emitted after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The chat list (or a chat row) changed
    Chats,
    /// Messages of one chat changed
    Messages { chat_id: String },
    /// All tables were wiped
    Cleared,
}

impl CacheEvent {
    /// Whether a message stream for `chat_id` must re-query
    pub fn affects_messages_of(&self, chat_id: &str) -> bool {
        match self {
            CacheEvent::Messages { chat_id: id } => id == chat_id,
            CacheEvent::Cleared => true,
            CacheEvent::Chats => false,
        }
    }
}

/// SQLite-backed chat cache
#[derive(Debug, Clone)]
pub struct ChatCache {
    db_path: PathBuf,
    events: broadcast::Sender<CacheEvent>,
}

impl ChatCache {
    /// Open the cache in the user's data directory
    ///
    /// Honors [`DB_ENV_VAR`] so the binary can be pointed at another file.
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::Storage` if the data directory cannot be
    /// determined or created, or the schema cannot be applied.
    pub fn new() -> StoreResult<Self> {
        if let Ok(override_path) = std::env::var(DB_ENV_VAR) {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("ai", "gbox", "chatdroid").ok_or_else(|| {
            ChatDroidError::Storage("Could not determine data directory".into())
        })?;

        Self::new_with_path(proj_dirs.data_dir().join("chatdroid.db"))
    }

    /// Open the cache at a specific database path
    ///
    /// # Examples
    ///
    /// ```
    /// use chatdroid::storage::ChatCache;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let cache = ChatCache::new_with_path(dir.path().join("cache.db")).unwrap();
    /// assert_eq!(cache.count_chats().unwrap(), 0);
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> StoreResult<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ChatDroidError::storage("Failed to create parent directory for database", e)
                })?;
            }
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cache = Self { db_path, events };
        cache.init()?;
        tracing::debug!("Opened chat cache at {}", cache.db_path.display());
        Ok(cache)
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: CacheEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    fn open(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| ChatDroidError::storage("Failed to open database", e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ChatDroidError::storage("Failed to set busy timeout", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| ChatDroidError::storage("Failed to enable foreign keys", e))?;
        Ok(conn)
    }

    fn init(&self) -> StoreResult<()> {
        let conn = self.open()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| ChatDroidError::storage("Failed to read schema version", e))?;
        if version < SCHEMA_VERSION {
            if version > 0 {
                tracing::info!(
                    "Rebuilding message cache (schema {} -> {})",
                    version,
                    SCHEMA_VERSION
                );
            }
            conn.execute_batch(LEGACY_TABLES)
                .map_err(|e| ChatDroidError::storage("Failed to drop old tables", e))?;
        }
        conn.execute_batch(SCHEMA)
            .map_err(|e| ChatDroidError::storage("Failed to create tables", e))?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
            .map_err(|e| ChatDroidError::storage("Failed to write schema version", e))?;
        Ok(())
    }

    /// Upsert list rows from the server in one transaction
    ///
    /// Only list-level columns are touched; models, share and folder ids from
    /// an earlier full fetch are kept.
    pub fn upsert_chat_summaries(&self, summaries: &[ChatSummary]) -> StoreResult<()> {
        let mut conn = self.open()?;
        let tx = begin(&mut conn)?;
        for summary in summaries {
            tx.execute(
                "INSERT INTO chats (id, title, created_at, updated_at, archived, pinned)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    archived = excluded.archived,
                    pinned = excluded.pinned",
                params![
                    summary.id,
                    summary.title,
                    summary.created_at,
                    summary.updated_at,
                    summary.archived,
                    summary.pinned
                ],
            )
            .map_err(|e| ChatDroidError::storage("Failed to upsert chat", e))?;
        }
        commit(tx)?;
        self.notify(CacheEvent::Chats);
        Ok(())
    }

    /// Insert or fully update a single chat row
    pub fn upsert_chat(&self, chat: &CachedChat) -> StoreResult<()> {
        let conn = self.open()?;
        upsert_chat_row(&conn, chat)?;
        self.notify(CacheEvent::Chats);
        Ok(())
    }

    /// Store a fresh chat snapshot: the chat row, its thread and attachments
    ///
    /// Runs in one transaction. Thread messages are stored as `sent`; cached
    /// messages absent from the snapshot (such as failed local sends) are
    /// left untouched.
    pub fn apply_chat_snapshot(&self, chat: &ChatResponse, thread: &[Message]) -> StoreResult<()> {
        let mut conn = self.open()?;
        let tx = begin(&mut conn)?;

        upsert_chat_row(&tx, &CachedChat::from(chat))?;
        for message in thread {
            let row = CachedMessage::from_message(&chat.id, message, MessageStatus::Sent);
            upsert_message_row(&tx, &row)?;
            for (index, file) in message.files.iter().enumerate() {
                let attachment =
                    CachedAttachment::from_file_ref(&chat.id, &message.id, index, file);
                upsert_attachment_row(&tx, &attachment)?;
            }
        }

        commit(tx)?;
        self.notify(CacheEvent::Chats);
        self.notify(CacheEvent::Messages {
            chat_id: chat.id.clone(),
        });
        Ok(())
    }

    /// Insert or update one message row
    ///
    /// # Errors
    ///
    /// Fails with a storage error when the owning chat is not cached.
    pub fn upsert_message(&self, message: &CachedMessage) -> StoreResult<()> {
        let conn = self.open()?;
        upsert_message_row(&conn, message)?;
        self.notify(CacheEvent::Chats);
        self.notify(CacheEvent::Messages {
            chat_id: message.chat_id.clone(),
        });
        Ok(())
    }

    /// Change the delivery status of a message cached under `chat_id`
    ///
    /// Returns `false` if the message is not cached in that chat.
    pub fn set_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> StoreResult<bool> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                "UPDATE messages SET status = ?1 WHERE chat_id = ?2 AND id = ?3",
                params![status.as_str(), chat_id, message_id],
            )
            .map_err(|e| ChatDroidError::storage("Failed to update message status", e))?;
        if changed == 0 {
            return Ok(false);
        }

        self.notify(CacheEvent::Messages {
            chat_id: chat_id.to_string(),
        });
        Ok(true)
    }

    /// Active (non-archived) chats, pinned first then most recently updated
    pub fn active_chats(&self) -> StoreResult<Vec<ChatListEntry>> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {CHAT_COLUMNS}, COUNT(m.id), MAX(m.timestamp)
             FROM chats c
             LEFT JOIN messages m ON m.chat_id = c.id
             WHERE c.archived = 0
             GROUP BY c.id
             ORDER BY c.pinned DESC, c.updated_at DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ChatDroidError::storage("Failed to prepare statement", e))?;

        let rows = stmt
            .query_map([], |row| {
                let chat = chat_from_row(row)?;
                let count: i64 = row.get(9)?;
                let last: Option<i64> = row.get(10)?;
                Ok(ChatListEntry {
                    chat,
                    message_count: count.max(0) as usize,
                    last_message_time: last,
                })
            })
            .map_err(|e| ChatDroidError::storage("Failed to query chats", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChatDroidError::storage("Failed to read chat row", e))
    }

    /// Look up one cached chat
    pub fn get_chat(&self, chat_id: &str) -> StoreResult<Option<CachedChat>> {
        let conn = self.open()?;
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1");
        conn.query_row(&sql, params![chat_id], chat_from_row)
            .optional()
            .map_err(|e| ChatDroidError::storage("Failed to query chat", e))
    }

    /// Chats whose title contains `query`, most recently updated first
    ///
    /// Matching is a case-insensitive literal substring test; `%` and `_`
    /// have no special meaning.
    pub fn search_chats(&self, query: &str) -> StoreResult<Vec<CachedChat>> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats c
             WHERE instr(lower(c.title), lower(?1)) > 0
             ORDER BY c.updated_at DESC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ChatDroidError::storage("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![query], chat_from_row)
            .map_err(|e| ChatDroidError::storage("Failed to search chats", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChatDroidError::storage("Failed to read chat row", e))
    }

    /// Messages of a chat in timestamp order (insertion order breaks ties)
    pub fn messages_for_chat(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        self.query_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 ORDER BY timestamp ASC, rowid ASC"
            ),
            chat_id,
        )
    }

    /// Messages of a chat whose remote send failed
    pub fn failed_messages(&self, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        self.query_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 AND status = 'failed' ORDER BY timestamp ASC, rowid ASC"
            ),
            chat_id,
        )
    }

    /// Newest cached message of a chat that has not failed to send
    ///
    /// Failed rows never reached the server, so nothing may be chained under
    /// them.
    pub fn latest_message(&self, chat_id: &str) -> StoreResult<Option<CachedMessage>> {
        let conn = self.open()?;
        conn.query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1 AND status != 'failed'
                 ORDER BY timestamp DESC, rowid DESC LIMIT 1"
            ),
            params![chat_id],
            message_from_row,
        )
        .optional()
        .map_err(|e| ChatDroidError::storage("Failed to query latest message", e))
    }

    fn query_messages(&self, sql: &str, chat_id: &str) -> StoreResult<Vec<CachedMessage>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ChatDroidError::storage("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![chat_id], message_from_row)
            .map_err(|e| ChatDroidError::storage("Failed to query messages", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChatDroidError::storage("Failed to read message row", e))
    }

    /// Attachments of one message in one chat
    pub fn attachments_for_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> StoreResult<Vec<CachedAttachment>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, message_id, filename, content_type, size, local_path, remote_url
                 FROM attachments WHERE chat_id = ?1 AND message_id = ?2 ORDER BY rowid ASC",
            )
            .map_err(|e| ChatDroidError::storage("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map(params![chat_id, message_id], |row| {
                Ok(CachedAttachment {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    message_id: row.get(2)?,
                    filename: row.get(3)?,
                    content_type: row.get(4)?,
                    size: row.get(5)?,
                    local_path: row.get(6)?,
                    remote_url: row.get(7)?,
                })
            })
            .map_err(|e| ChatDroidError::storage("Failed to query attachments", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChatDroidError::storage("Failed to read attachment row", e))
    }

    /// Delete a chat; messages and attachments cascade
    ///
    /// Returns `true` if a row was removed.
    pub fn delete_chat(&self, chat_id: &str) -> StoreResult<bool> {
        let conn = self.open()?;
        let removed = conn
            .execute("DELETE FROM chats WHERE id = ?1", params![chat_id])
            .map_err(|e| ChatDroidError::storage("Failed to delete chat", e))?;
        self.notify(CacheEvent::Chats);
        self.notify(CacheEvent::Messages {
            chat_id: chat_id.to_string(),
        });
        Ok(removed > 0)
    }

    /// Flip the pinned flag; returns the new value, or `None` if not cached
    pub fn toggle_pinned(&self, chat_id: &str) -> StoreResult<Option<bool>> {
        self.toggle_flag(chat_id, "pinned")
    }

    /// Flip the archived flag; returns the new value, or `None` if not cached
    pub fn toggle_archived(&self, chat_id: &str) -> StoreResult<Option<bool>> {
        self.toggle_flag(chat_id, "archived")
    }

    fn toggle_flag(&self, chat_id: &str, column: &'static str) -> StoreResult<Option<bool>> {
        let conn = self.open()?;
        let changed = conn
            .execute(
                &format!("UPDATE chats SET {column} = NOT {column} WHERE id = ?1"),
                params![chat_id],
            )
            .map_err(|e| ChatDroidError::storage("Failed to update chat", e))?;
        if changed == 0 {
            return Ok(None);
        }
        let value: bool = conn
            .query_row(
                &format!("SELECT {column} FROM chats WHERE id = ?1"),
                params![chat_id],
                |row| row.get(0),
            )
            .map_err(|e| ChatDroidError::storage("Failed to query chat", e))?;
        self.notify(CacheEvent::Chats);
        Ok(Some(value))
    }

    /// Number of cached chats
    pub fn count_chats(&self) -> StoreResult<usize> {
        let conn = self.open()?;
        count(&conn, "SELECT COUNT(*) FROM chats")
    }

    /// Row counts of every table
    pub fn stats(&self) -> StoreResult<CacheStats> {
        let conn = self.open()?;
        Ok(CacheStats {
            chats: count(&conn, "SELECT COUNT(*) FROM chats")?,
            messages: count(&conn, "SELECT COUNT(*) FROM messages")?,
            attachments: count(&conn, "SELECT COUNT(*) FROM attachments")?,
            failed_messages: count(&conn, "SELECT COUNT(*) FROM messages WHERE status = 'failed'")?,
        })
    }

    /// Remove every cached row
    pub fn clear_all(&self) -> StoreResult<()> {
        let mut conn = self.open()?;
        let tx = begin(&mut conn)?;
        tx.execute_batch("DELETE FROM attachments; DELETE FROM messages; DELETE FROM chats;")
            .map_err(|e| ChatDroidError::storage("Failed to clear cache", e))?;
        commit(tx)?;
        self.notify(CacheEvent::Cleared);
        Ok(())
    }
}

fn begin(conn: &mut Connection) -> StoreResult<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| ChatDroidError::storage("Failed to start transaction", e))
}

fn commit(tx: Transaction<'_>) -> StoreResult<()> {
    tx.commit()
        .map_err(|e| ChatDroidError::storage("Failed to commit transaction", e))
}

fn count(conn: &Connection, sql: &str) -> StoreResult<usize> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(|e| ChatDroidError::storage("Failed to count rows", e))?;
    Ok(n.max(0) as usize)
}

fn upsert_chat_row(conn: &Connection, chat: &CachedChat) -> StoreResult<()> {
    let models = serde_json::to_string(&chat.models)?;
    conn.execute(
        "INSERT INTO chats (id, title, created_at, updated_at, archived, pinned, models, share_id, folder_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            archived = excluded.archived,
            pinned = excluded.pinned,
            models = excluded.models,
            share_id = excluded.share_id,
            folder_id = excluded.folder_id",
        params![
            chat.id,
            chat.title,
            chat.created_at,
            chat.updated_at,
            chat.archived,
            chat.pinned,
            models,
            chat.share_id,
            chat.folder_id
        ],
    )
    .map_err(|e| ChatDroidError::storage("Failed to upsert chat", e))?;
    Ok(())
}

fn upsert_message_row(conn: &Connection, message: &CachedMessage) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO messages (id, chat_id, parent_id, role, content, model, timestamp, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(chat_id, id) DO UPDATE SET
            parent_id = excluded.parent_id,
            role = excluded.role,
            content = excluded.content,
            model = excluded.model,
            timestamp = excluded.timestamp,
            status = excluded.status",
        params![
            message.id,
            message.chat_id,
            message.parent_id,
            message.role.as_str(),
            message.content,
            message.model,
            message.timestamp,
            message.status.as_str()
        ],
    )
    .map_err(|e| ChatDroidError::storage("Failed to upsert message", e))?;
    Ok(())
}

fn upsert_attachment_row(conn: &Connection, attachment: &CachedAttachment) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO attachments (id, chat_id, message_id, filename, content_type, size, local_path, remote_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(chat_id, message_id, id) DO UPDATE SET
            filename = excluded.filename,
            content_type = excluded.content_type,
            size = excluded.size,
            local_path = COALESCE(excluded.local_path, attachments.local_path),
            remote_url = excluded.remote_url",
        params![
            attachment.id,
            attachment.chat_id,
            attachment.message_id,
            attachment.filename,
            attachment.content_type,
            attachment.size,
            attachment.local_path,
            attachment.remote_url
        ],
    )
    .map_err(|e| ChatDroidError::storage("Failed to upsert attachment", e))?;
    Ok(())
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<CachedChat> {
    let models_json: String = row.get(6)?;
    Ok(CachedChat {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        archived: row.get(4)?,
        pinned: row.get(5)?,
        models: serde_json::from_str(&models_json).unwrap_or_default(),
        share_id: row.get(7)?,
        folder_id: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<CachedMessage> {
    let role: String = row.get(3)?;
    let status: String = row.get(7)?;
    Ok(CachedMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        parent_id: row.get(2)?,
        role: role.parse().unwrap_or_default(),
        content: row.get(4)?,
        model: row.get(5)?,
        timestamp: row.get(6)?,
        status: MessageStatus::from_db(&status),
    })
}
