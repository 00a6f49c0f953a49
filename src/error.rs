//! Error types for ChatDroid
//!
//! This module defines the error taxonomy used throughout the client,
//! using `thiserror` for ergonomic error handling. Library layers (remote
//! API, cache, repositories) return [`StoreResult`]; the application edge
//! (config loading, commands, `main`) uses the anyhow-backed [`Result`].

use thiserror::Error;

/// Main error type for ChatDroid operations
///
/// Remote failures come in three shapes (transport, HTTP status, payload)
/// that callers usually treat the same way; see
/// [`ChatDroidError::is_remote`].
#[derive(Error, Debug)]
pub enum ChatDroidError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server could not be reached or the connection dropped
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success HTTP status
    #[error("API error {status}: {body}")]
    Status {
        /// HTTP status code returned by the server
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("Payload error: {0}")]
    Payload(String),

    /// Authentication errors (bad credentials, missing session)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A requested chat, message or file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local cache errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote creation failed and a local-only record was created instead
    #[error("Created local-only chat {local_id}: {reason}")]
    OfflineFallback {
        /// Client-generated id of the local chat
        local_id: String,
        /// Why the remote call failed
        reason: String,
    },

    /// WebSocket connection errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// File validation errors (size limits, unreadable files)
    #[error("File error: {0}")]
    File(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ChatDroidError {
    /// Returns `true` for failures that originate on the remote side
    ///
    /// Network, status, payload and not-found errors are all "remote
    /// failures" to the offline store.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatdroid::error::ChatDroidError;
    ///
    /// let err = ChatDroidError::Status { status: 502, body: String::new() };
    /// assert!(err.is_remote());
    /// assert!(!ChatDroidError::Storage("disk full".into()).is_remote());
    /// ```
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ChatDroidError::Network(_)
                | ChatDroidError::Status { .. }
                | ChatDroidError::Payload(_)
                | ChatDroidError::NotFound(_)
                | ChatDroidError::Authentication(_)
        )
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        ChatDroidError::Storage(format!("{}: {}", context, err))
    }
}

/// Result type alias for application-level operations
///
/// Uses `anyhow::Error` so commands can attach context freely.
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for library operations that must stay typed
pub type StoreResult<T> = std::result::Result<T, ChatDroidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ChatDroidError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_status_error_display() {
        let error = ChatDroidError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "API error 500: boom");
    }

    #[test]
    fn test_offline_fallback_display() {
        let error = ChatDroidError::OfflineFallback {
            local_id: "abc".to_string(),
            reason: "Network error: refused".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("abc"));
        assert!(s.contains("refused"));
    }

    #[test]
    fn test_remote_classification() {
        assert!(ChatDroidError::Network("down".into()).is_remote());
        assert!(ChatDroidError::Payload("bad".into()).is_remote());
        assert!(ChatDroidError::NotFound("chat".into()).is_remote());
        assert!(!ChatDroidError::Config("x".into()).is_remote());
        assert!(!ChatDroidError::File("x".into()).is_remote());
    }

    #[test]
    fn test_storage_helper_prefixes_context() {
        let error = ChatDroidError::storage("Failed to open database", "locked");
        assert_eq!(
            error.to_string(),
            "Storage error: Failed to open database: locked"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ChatDroidError = io_error.into();
        assert!(matches!(error, ChatDroidError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ChatDroidError = json_error.into();
        assert!(matches!(error, ChatDroidError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatDroidError>();
    }
}
