//! File-backed preference stores
//!
//! A [`PreferenceStore`] holds one serde value persisted as JSON. Stores are
//! constructed explicitly and passed to whatever needs them; changes are
//! published on a tokio `watch` channel so long-running commands can react.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{ChatDroidError, StoreResult};

/// File name of the application settings store
pub const SETTINGS_FILE: &str = "settings.json";

/// File name of the auth session store
pub const SESSION_FILE: &str = "session.json";

/// JSON file store for a single preferences value
#[derive(Debug)]
pub struct PreferenceStore<T> {
    path: PathBuf,
    sender: watch::Sender<T>,
}

impl<T> PreferenceStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    /// Open the store at `path`, starting from defaults if the file is
    /// missing or unreadable
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::Io` if the parent directory cannot be created.
    pub fn open<P: Into<PathBuf>>(path: P) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let value = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable preferences {}: {}", path.display(), e);
                T::default()
            }),
            Err(_) => T::default(),
        };

        let (sender, _) = watch::channel(value);
        Ok(Self { path, sender })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Apply `edit` to a copy of the value, persist it, then publish it
    ///
    /// Nothing is published if writing the file fails.
    pub fn update<F>(&self, edit: F) -> StoreResult<T>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get();
        edit(&mut value);
        self.persist(&value)?;
        self.sender.send_replace(value.clone());
        Ok(value)
    }

    /// Restore defaults and delete the backing file
    pub fn reset(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.sender.send_replace(T::default());
        Ok(())
    }

    /// Receive every subsequent change
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    fn persist(&self, value: &T) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// User-adjustable application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model for new messages; falls back to `chat.default_model`
    pub default_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub show_timestamps: bool,
    pub telemetry_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_model: None,
            max_tokens: 2048,
            temperature: 0.7,
            show_timestamps: true,
            telemetry_enabled: false,
        }
    }
}

impl AppSettings {
    /// Keys accepted by [`AppSettings::set`]
    pub const KEYS: [&'static str; 5] = [
        "default_model",
        "max_tokens",
        "temperature",
        "show_timestamps",
        "telemetry",
    ];

    /// Set one setting from its textual form
    ///
    /// # Errors
    ///
    /// Returns `ChatDroidError::Config` for unknown keys or values that do
    /// not parse or fall outside their range.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatdroid::preferences::AppSettings;
    ///
    /// let mut settings = AppSettings::default();
    /// settings.set("temperature", "0.2").unwrap();
    /// assert_eq!(settings.temperature, 0.2);
    /// assert!(settings.set("temperature", "7").is_err());
    /// ```
    pub fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let invalid = |reason: &str| {
            ChatDroidError::Config(format!("Invalid value '{}' for {}: {}", value, key, reason))
        };

        match key {
            "default_model" => {
                let trimmed = value.trim();
                self.default_model = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
            }
            "max_tokens" => {
                let parsed: u32 = value.parse().map_err(|_| invalid("expected an integer"))?;
                if parsed == 0 {
                    return Err(invalid("must be greater than 0"));
                }
                self.max_tokens = parsed;
            }
            "temperature" => {
                let parsed: f32 = value.parse().map_err(|_| invalid("expected a number"))?;
                if !(0.0..=2.0).contains(&parsed) {
                    return Err(invalid("must be between 0.0 and 2.0"));
                }
                self.temperature = parsed;
            }
            "show_timestamps" => {
                self.show_timestamps = parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
            }
            "telemetry" => {
                self.telemetry_enabled = parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
            }
            other => {
                return Err(ChatDroidError::Config(format!(
                    "Unknown setting '{}'. Valid keys: {}",
                    other,
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Signed-in session persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSession {
    pub token: Option<String>,
    pub token_type: Option<String>,
    /// Seconds since the epoch
    pub expires_at: Option<i64>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl AuthSession {
    /// Whether a non-empty token is stored
    pub fn is_signed_in(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether the token's expiry has passed at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

pub type AppPreferences = PreferenceStore<AppSettings>;
pub type AuthPreferences = PreferenceStore<AuthSession>;
