//! ChatDroid - offline-first Open WebUI client library
//!
//! This library provides the core of the ChatDroid client: the Open WebUI
//! API client, thread reconstruction, the local SQLite chat cache and the
//! offline-first store built on top of them.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `api`: REST client, WebSocket connection, wire types and an in-memory fake
//! - `thread`: Rebuilding a linear conversation from a chat's message tree
//! - `storage`: SQLite chat cache with change notifications
//! - `repository`: Offline-first chat store, auth session and file transfers
//! - `preferences`: File-backed settings and session stores
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatdroid::api::OpenWebUiClient;
//! use chatdroid::repository::OfflineChatStore;
//! use chatdroid::storage::ChatCache;
//! use chatdroid::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = OpenWebUiClient::new(&config.server)?;
//!     let store = OfflineChatStore::new(Arc::new(client), ChatCache::new()?);
//!     store.refresh_chats().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod file_utils;
pub mod preferences;
pub mod repository;
pub mod storage;
pub mod thread;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatDroidError, Result, StoreResult};
pub use repository::OfflineChatStore;
pub use thread::reconstruct_thread;

#[cfg(test)]
pub mod test_utils;
