//! Configuration management for ChatDroid
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatDroidError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Model used when neither config nor settings name one
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Title given to chats created without one
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Main configuration structure for ChatDroid
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Server connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Local storage locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chat defaults
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Base URL of the REST API, including the `/api/v1/` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// WebSocket URL; derived from `base_url` when unset
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Request timeout; no timeout when unset
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/v1/".to_string()
}

fn default_user_agent() -> String {
    format!("chatdroid/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            websocket_url: None,
            timeout_seconds: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ServerConfig {
    /// Effective WebSocket URL
    ///
    /// Uses `websocket_url` when configured, otherwise swaps the base URL's
    /// scheme to `ws`/`wss` and points at the server's socket endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatdroid::config::ServerConfig;
    ///
    /// let server = ServerConfig {
    ///     base_url: "https://chat.example.com/api/v1/".to_string(),
    ///     ..ServerConfig::default()
    /// };
    /// assert!(server.websocket_url().unwrap().starts_with("wss://chat.example.com/ws/"));
    /// ```
    pub fn websocket_url(&self) -> Result<String> {
        if let Some(url) = &self.websocket_url {
            return Ok(url.clone());
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ChatDroidError::Config(format!("Invalid server.base_url: {}", e)))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ChatDroidError::Config(format!("Cannot derive WebSocket URL from {}", self.base_url)))?;
        url.set_path("/ws/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url.to_string())
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Cache database file; platform data directory when unset
    #[serde(default)]
    pub database_path: Option<String>,

    /// Directory holding settings and session files; platform config
    /// directory when unset
    #[serde(default)]
    pub preferences_dir: Option<String>,
}

impl StorageConfig {
    /// Resolve the preferences directory
    pub fn preferences_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.preferences_dir {
            return Ok(PathBuf::from(dir));
        }
        let dirs = ProjectDirs::from("ai", "gbox", "chatdroid").ok_or_else(|| {
            ChatDroidError::Config("Could not determine config directory".to_string())
        })?;
        Ok(dirs.config_dir().to_path_buf())
    }
}

/// Chat defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Model used when settings do not choose one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Title for chats created without one
    #[serde(default = "default_title")]
    pub default_title: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_title: default_title(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatDroidError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatDroidError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("CHATDROID_SERVER_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(ws_url) = std::env::var("CHATDROID_WS_URL") {
            self.server.websocket_url = Some(ws_url);
        }

        if let Ok(timeout) = std::env::var("CHATDROID_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.server.timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid CHATDROID_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(dir) = std::env::var("CHATDROID_PREFERENCES_DIR") {
            self.storage.preferences_dir = Some(dir);
        }

        if let Ok(model) = std::env::var("CHATDROID_DEFAULT_MODEL") {
            self.chat.default_model = model;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(server) = &cli.server {
            self.server.base_url = server.clone();
        }
        if let Some(db) = &cli.storage_path {
            self.storage.database_path = Some(db.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.server.base_url).map_err(|e| {
            ChatDroidError::Config(format!(
                "server.base_url is not a valid URL ({}): {}",
                self.server.base_url, e
            ))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ChatDroidError::Config(format!(
                "server.base_url must use http or https, got {}",
                base.scheme()
            ))
            .into());
        }

        if let Some(ws) = &self.server.websocket_url {
            let ws_url = Url::parse(ws).map_err(|e| {
                ChatDroidError::Config(format!("server.websocket_url is not a valid URL: {}", e))
            })?;
            if !matches!(ws_url.scheme(), "ws" | "wss") {
                return Err(ChatDroidError::Config(
                    "server.websocket_url must use ws or wss".to_string(),
                )
                .into());
            }
        }

        if self.server.timeout_seconds == Some(0) {
            return Err(ChatDroidError::Config(
                "server.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.default_model.trim().is_empty() {
            return Err(
                ChatDroidError::Config("chat.default_model cannot be empty".to_string()).into(),
            );
        }

        if self.chat.default_title.trim().is_empty() {
            return Err(
                ChatDroidError::Config("chat.default_title cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "http://localhost:8080/api/v1/");
        assert_eq!(config.server.timeout_seconds, None);
        assert_eq!(config.chat.default_model, DEFAULT_MODEL);
        assert_eq!(config.chat.default_title, "New Chat");
    }

    #[test]
    fn test_parse_yaml_config() {
        let config: Config = serde_yaml::from_str(&crate::test_utils::test_config_yaml()).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8080/api/v1/");
        assert_eq!(config.server.timeout_seconds, Some(5));
        assert_eq!(config.chat.default_model, "llama3");
        assert_eq!(config.chat.default_title, "Untitled");
        assert_eq!(config.storage, StorageConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_base_url() {
        let mut config = Config::default();
        config.server.base_url = "localhost".to_string();
        assert!(config.validate().is_err());

        config.server.base_url = "ftp://host/api/v1/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_websocket_scheme() {
        let mut config = Config::default();
        config.server.websocket_url = Some("http://host/ws".to_string());
        assert!(config.validate().is_err());

        config.server.websocket_url = Some("wss://host/ws".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.server.timeout_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_title() {
        let mut config = Config::default();
        config.chat.default_title = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
server:
  base_url: https://chat.example.com/api/v1/
  timeout_seconds: 30
storage:
  database_path: /tmp/chatdroid.db
chat:
  default_model: llama3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.base_url, "https://chat.example.com/api/v1/");
        assert_eq!(config.server.timeout_seconds, Some(30));
        assert_eq!(config.storage.database_path.as_deref(), Some("/tmp/chatdroid.db"));
        assert_eq!(config.chat.default_model, "llama3");
        assert_eq!(config.chat.default_title, "New Chat");
    }

    #[test]
    fn test_websocket_url_derivation() {
        let server = ServerConfig::default();
        assert_eq!(
            server.websocket_url().unwrap(),
            "ws://localhost:8080/ws/socket.io/?EIO=4&transport=websocket"
        );

        let explicit = ServerConfig {
            websocket_url: Some("ws://other/ws".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(explicit.websocket_url().unwrap(), "ws://other/ws");
    }

    #[test]
    fn test_preferences_dir_override() {
        let storage = StorageConfig {
            preferences_dir: Some("/tmp/prefs".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.preferences_dir().unwrap(), PathBuf::from("/tmp/prefs"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults_and_cli_overrides() {
        let cli = crate::cli::Cli {
            server: Some("http://override:9000/api/v1/".to_string()),
            storage_path: Some("/tmp/override.db".to_string()),
            ..Default::default()
        };
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        assert_eq!(config.server.base_url, "http://override:9000/api/v1/");
        assert_eq!(config.storage.database_path.as_deref(), Some("/tmp/override.db"));
    }

    #[test]
    #[serial]
    fn test_env_vars_override_file_values() {
        std::env::set_var("CHATDROID_DEFAULT_MODEL", "mistral");
        std::env::set_var("CHATDROID_TIMEOUT_SECONDS", "not-a-number");

        let mut config = Config::default();
        config.apply_env_vars();
        assert_eq!(config.chat.default_model, "mistral");
        assert_eq!(config.server.timeout_seconds, None);

        std::env::remove_var("CHATDROID_DEFAULT_MODEL");
        std::env::remove_var("CHATDROID_TIMEOUT_SECONDS");
    }
}
