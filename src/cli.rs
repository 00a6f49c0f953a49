//! Command-line interface definition for ChatDroid
//!
//! This module defines the CLI structure using clap's derive API: chat
//! browsing and messaging, authentication, files, models, settings and
//! cache maintenance.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChatDroid - offline-first Open WebUI client
///
/// Browse and send chats against an Open WebUI server, with a local cache
/// that keeps chats readable offline.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatdroid")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the cache database path
    #[arg(long, env = "CHATDROID_DB")]
    pub storage_path: Option<String>,

    /// Override the server base URL (for example http://host:8080/api/v1/)
    #[arg(long)]
    pub server: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ChatDroid
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        email: String,

        /// Password; read from CHATDROID_PASSWORD or prompted when omitted
        #[arg(short, long, env = "CHATDROID_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Browse and manage chats
    Chats {
        #[command(subcommand)]
        command: ChatsCommand,
    },

    /// Send a message to a chat and print the reply
    Send {
        /// Chat identifier
        chat_id: String,

        /// Message text
        text: String,
    },

    /// Refresh the cached chat list from the server once
    Sync,

    /// Manage AI models
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },

    /// Upload and manage files
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },

    /// Show or change application settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Connect to the WebSocket endpoint and print events
    Listen {
        /// WebSocket URL (defaults to the configured one)
        #[arg(long)]
        url: Option<String>,
    },
}

/// Chat subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ChatsCommand {
    /// List active chats (cache first, then one refresh)
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a chat's thread
    Show {
        /// Chat identifier
        id: String,

        /// Keep printing updates until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Create a new chat
    New {
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Delete a chat locally and on the server
    Delete { id: String },

    /// Search cached chat titles
    Search { query: String },

    /// Toggle the pinned flag
    Pin { id: String },

    /// Toggle the archived flag
    Archive { id: String },

    /// List messages whose send failed
    Failed { id: String },
}

/// Model subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelsCommand {
    /// List available models
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// File subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum FilesCommand {
    /// Upload a file
    Upload { path: PathBuf },

    /// List uploaded files
    List {
        #[arg(short, long)]
        json: bool,
    },

    /// Show file metadata
    Info { id: String },

    /// Delete an uploaded file
    Delete { id: String },

    /// Download a file's content
    Download {
        id: String,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print current settings
    Show,

    /// Change one setting (default_model, max_tokens, temperature,
    /// show_timestamps, telemetry)
    Set { key: String, value: String },
}

/// Cache subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Print row counts
    Stats,

    /// Remove every cached chat, message and attachment
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            storage_path: None,
            server: None,
            command: Commands::Sync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Sync));
    }

    #[test]
    fn test_cli_parse_login() {
        let cli =
            Cli::try_parse_from(["chatdroid", "login", "--email", "a@b.c", "--password", "pw"])
                .unwrap();
        if let Commands::Login { email, password } = cli.command {
            assert_eq!(email, "a@b.c");
            assert_eq!(password.as_deref(), Some("pw"));
        } else {
            panic!("Expected Login command");
        }
    }

    #[test]
    fn test_cli_parse_chats_list_json() {
        let cli = Cli::try_parse_from(["chatdroid", "chats", "list", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Chats {
                command: ChatsCommand::List { json: true }
            }
        ));
    }

    #[test]
    fn test_cli_parse_chats_show_watch() {
        let cli = Cli::try_parse_from(["chatdroid", "chats", "show", "c1", "-w"]).unwrap();
        if let Commands::Chats {
            command: ChatsCommand::Show { id, watch },
        } = cli.command
        {
            assert_eq!(id, "c1");
            assert!(watch);
        } else {
            panic!("Expected Chats Show command");
        }
    }

    #[test]
    fn test_cli_parse_send() {
        let cli = Cli::try_parse_from(["chatdroid", "send", "c1", "hello there"]).unwrap();
        if let Commands::Send { chat_id, text } = cli.command {
            assert_eq!(chat_id, "c1");
            assert_eq!(text, "hello there");
        } else {
            panic!("Expected Send command");
        }
    }

    #[test]
    fn test_cli_parse_files_download_requires_output() {
        assert!(Cli::try_parse_from(["chatdroid", "files", "download", "f1"]).is_err());
        let cli =
            Cli::try_parse_from(["chatdroid", "files", "download", "f1", "-o", "out.bin"]).unwrap();
        if let Commands::Files {
            command: FilesCommand::Download { id, output },
        } = cli.command
        {
            assert_eq!(id, "f1");
            assert_eq!(output, PathBuf::from("out.bin"));
        } else {
            panic!("Expected Files Download command");
        }
    }

    #[test]
    fn test_cli_parse_settings_set() {
        let cli =
            Cli::try_parse_from(["chatdroid", "settings", "set", "temperature", "0.3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Settings {
                command: SettingsCommand::Set { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "chatdroid",
            "-v",
            "--storage-path",
            "/tmp/x.db",
            "--server",
            "http://h/api/v1/",
            "cache",
            "stats",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.storage_path.as_deref(), Some("/tmp/x.db"));
        assert_eq!(cli.server.as_deref(), Some("http://h/api/v1/"));
    }

    #[test]
    fn test_cli_parse_missing_command() {
        assert!(Cli::try_parse_from(["chatdroid"]).is_err());
    }

    #[test]
    fn test_cli_parse_invalid_command() {
        assert!(Cli::try_parse_from(["chatdroid", "frobnicate"]).is_err());
    }
}
