//! ChatDroid - offline-first Open WebUI client
//!
#![doc = "ChatDroid - offline-first Open WebUI client"]
#![doc = "Main entry point for the ChatDroid command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatdroid::cli::{
    CacheCommand, ChatsCommand, Cli, Commands, FilesCommand, ModelsCommand, SettingsCommand,
};
use chatdroid::commands::{self, AppContext};
use chatdroid::config::Config;
use chatdroid::storage::DB_ENV_VAR;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Mirror the storage override so `ChatCache::new()` honors it as well
    if let Some(db_path) = &cli.storage_path {
        std::env::set_var(DB_ENV_VAR, db_path);
        tracing::info!("Using cache DB override from CLI: {}", db_path);
    }

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let ctx = AppContext::new(config)?;
    let show_timestamps = ctx.settings.get().show_timestamps;

    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Signing in");
            commands::auth::login(&ctx.auth, &email, password).await
        }
        Commands::Logout => commands::auth::logout(&ctx.auth),
        Commands::Chats { command } => {
            let store = ctx.store()?;
            match command {
                ChatsCommand::List { json } => commands::chats::list_chats(&store, json).await,
                ChatsCommand::Show { id, watch } => {
                    commands::chats::show_chat(&store, &id, watch, show_timestamps).await
                }
                ChatsCommand::New { title } => {
                    commands::chats::new_chat(&store, title.as_deref()).await
                }
                ChatsCommand::Delete { id } => commands::chats::delete_chat(&store, &id).await,
                ChatsCommand::Search { query } => {
                    commands::chats::search_chats(&store, &query).await
                }
                ChatsCommand::Pin { id } => commands::chats::toggle_pin(&store, &id).await,
                ChatsCommand::Archive { id } => commands::chats::toggle_archive(&store, &id).await,
                ChatsCommand::Failed { id } => commands::chats::failed_messages(&store, &id).await,
            }
        }
        Commands::Send { chat_id, text } => {
            let store = ctx.store()?;
            commands::chats::send_message(&store, &chat_id, &text).await
        }
        Commands::Sync => {
            let store = ctx.store()?;
            commands::chats::sync(&store).await
        }
        Commands::Models { command } => match command {
            ModelsCommand::List { json } => commands::models::list_models(&ctx.client, json).await,
        },
        Commands::Files { command } => {
            let files = ctx.files();
            match command {
                FilesCommand::Upload { path } => commands::files::upload(&files, &path).await,
                FilesCommand::List { json } => commands::files::list(&files, json).await,
                FilesCommand::Info { id } => commands::files::info(&files, &id).await,
                FilesCommand::Delete { id } => commands::files::delete(&files, &id).await,
                FilesCommand::Download { id, output } => {
                    commands::files::download(&files, &id, &output).await
                }
            }
        }
        Commands::Settings { command } => match command {
            SettingsCommand::Show => {
                commands::settings::show(&ctx.settings, &ctx.config);
                Ok(())
            }
            SettingsCommand::Set { key, value } => {
                commands::settings::set(&ctx.settings, &key, &value)
            }
        },
        Commands::Cache { command } => {
            let store = ctx.store()?;
            match command {
                CacheCommand::Stats => commands::cache::stats(&store).await,
                CacheCommand::Clear => commands::cache::clear(&store).await,
            }
        }
        Commands::Listen { url } => {
            let url = match url {
                Some(url) => url,
                None => ctx.config.server.websocket_url()?,
            };
            let token = ctx.client.token();
            commands::listen::listen(&url, token.as_deref()).await
        }
    }
}

/// Initialize tracing/logging
///
/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chatdroid=debug"
    } else {
        "chatdroid=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
