/*!
Command handlers for the CLI

Each submodule handles one command group:

- `auth`     - login and logout
- `chats`    - chat list, threads, sending and chat mutations
- `files`    - uploads and downloads
- `models`   - model listing
- `settings` - application settings
- `cache`    - local cache maintenance
- `listen`   - raw WebSocket event viewer

Handlers share an [`AppContext`] built once from the loaded configuration.
*/

use std::sync::Arc;

use crate::api::{seconds_to_datetime, CompletionSettings, OpenWebUiClient};
use crate::config::Config;
use crate::error::Result;
use crate::preferences::{AppPreferences, AppSettings, AuthPreferences, SESSION_FILE, SETTINGS_FILE};
use crate::repository::{AuthRepository, FileRepository, OfflineChatStore};
use crate::storage::ChatCache;

pub mod auth;
pub mod cache;
pub mod chats;
pub mod files;
pub mod listen;
pub mod models;
pub mod settings;

/// Services shared by command handlers
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub client: OpenWebUiClient,
    pub auth: AuthRepository,
    pub settings: Arc<AppPreferences>,
}

impl AppContext {
    /// Build the HTTP client and open the preference stores
    ///
    /// A stored, unexpired session token is installed on the client and the
    /// saved generation settings are applied to completion requests.
    pub fn new(config: Config) -> Result<Self> {
        let client = OpenWebUiClient::new(&config.server)?;

        let prefs_dir = config.storage.preferences_dir()?;
        tracing::debug!("Using preferences directory {}", prefs_dir.display());
        let settings = Arc::new(AppPreferences::open(prefs_dir.join(SETTINGS_FILE))?);
        let session = Arc::new(AuthPreferences::open(prefs_dir.join(SESSION_FILE))?);

        let auth = AuthRepository::new(client.clone(), session);
        if !auth.restore_session() {
            tracing::debug!("No active session; requests are unauthenticated");
        }

        client.set_completion_settings(completion_settings(&config, &settings.get()));

        Ok(Self {
            config,
            client,
            auth,
            settings,
        })
    }

    /// Open the chat cache at the configured location
    pub fn cache(&self) -> Result<ChatCache> {
        let cache = match &self.config.storage.database_path {
            Some(path) => ChatCache::new_with_path(path)?,
            None => ChatCache::new()?,
        };
        Ok(cache)
    }

    pub fn store(&self) -> Result<OfflineChatStore> {
        Ok(
            OfflineChatStore::new(Arc::new(self.client.clone()), self.cache()?)
                .with_default_title(self.config.chat.default_title.clone()),
        )
    }

    pub fn files(&self) -> FileRepository {
        FileRepository::new(self.client.clone())
    }
}

/// Completion settings from saved preferences, falling back to config
pub fn completion_settings(config: &Config, settings: &AppSettings) -> CompletionSettings {
    CompletionSettings {
        model: settings
            .default_model
            .clone()
            .unwrap_or_else(|| config.chat.default_model.clone()),
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
    }
}

/// Local `YYYY-MM-DD HH:MM` rendering of epoch seconds
pub(crate) fn format_timestamp(secs: i64) -> String {
    seconds_to_datetime(secs)
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Shorten `text` to `max` characters, marking the cut with `...`
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
