//! Chat commands: list, show, send, sync and chat mutations

use colored::Colorize;
use prettytable::{format, Table};
use tokio_stream::StreamExt;

use super::{format_timestamp, truncate};
use crate::api::{Message, Role};
use crate::error::{ChatDroidError, Result};
use crate::repository::OfflineChatStore;
use crate::storage::{CachedChat, CachedMessage, ChatListEntry, MessageStatus};

/// Print the chat list after one refresh attempt
///
/// Offline, the cached list is printed with a warning.
pub async fn list_chats(store: &OfflineChatStore, json: bool) -> Result<()> {
    if let Err(e) = store.refresh_chats().await {
        tracing::warn!("Chat refresh failed: {}", e);
        if !json {
            println!("{}", format!("Offline, showing cached chats ({})", e).yellow());
        }
    }
    let entries = store.cached_chats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    print_chat_table(&entries);
    Ok(())
}

fn print_chat_table(entries: &[ChatListEntry]) {
    if entries.is_empty() {
        println!("{}", "No chats found.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Updated".bold()
    ]);

    for entry in entries {
        let title = truncate(&entry.chat.title, 40);
        let title = if entry.chat.pinned {
            format!("* {}", title)
        } else {
            title
        };
        table.add_row(prettytable::row![
            entry.chat.id.cyan(),
            title,
            entry.message_count,
            format_timestamp(entry.chat.updated_at)
        ]);
    }

    table.printstd();
}

/// Print a chat's thread
///
/// Without `watch` the thread is refreshed once and printed in conversation
/// order, falling back to cached messages when offline. With `watch` every
/// change to the cached messages is printed until Ctrl-C.
pub async fn show_chat(
    store: &OfflineChatStore,
    chat_id: &str,
    watch: bool,
    show_timestamps: bool,
) -> Result<()> {
    if watch {
        return watch_chat(store, chat_id, show_timestamps).await;
    }

    match store.refresh_messages(chat_id).await {
        Ok(thread) => {
            if thread.is_empty() {
                println!("{}", "No messages yet.".yellow());
            }
            for message in &thread {
                print_message(message, None, show_timestamps);
            }
        }
        Err(e) if e.is_remote() && !matches!(e, ChatDroidError::NotFound(_)) => {
            println!("{}", format!("Offline, showing cached messages ({})", e).yellow());
            print_cached(&store.cached_messages(chat_id).await?, show_timestamps);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn watch_chat(store: &OfflineChatStore, chat_id: &str, show_timestamps: bool) -> Result<()> {
    let mut updates = store.messages_for_chat(chat_id);
    println!("{}", format!("Watching chat {} (Ctrl-C to stop)", chat_id).cyan());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.next() => match update {
                Some(messages) => {
                    println!("{}", "-".repeat(40).dimmed());
                    print_cached(&messages, show_timestamps);
                }
                None => break,
            },
        }
    }
    Ok(())
}

fn print_cached(messages: &[CachedMessage], show_timestamps: bool) {
    if messages.is_empty() {
        println!("{}", "No cached messages.".yellow());
    }
    for message in messages {
        print_message(&message.to_message(), Some(message.status), show_timestamps);
    }
}

fn print_message(message: &Message, status: Option<MessageStatus>, show_timestamps: bool) {
    let role = match message.role {
        Role::User => "you".green().bold(),
        Role::Assistant => message
            .model
            .clone()
            .unwrap_or_else(|| "assistant".to_string())
            .blue()
            .bold(),
        Role::System => "system".magenta().bold(),
    };
    let prefix = if show_timestamps {
        format!("[{}] ", format_timestamp(message.timestamp))
    } else {
        String::new()
    };
    let marker = match status {
        Some(MessageStatus::Failed) => format!(" {}", "(failed)".red()),
        Some(MessageStatus::Pending) => format!(" {}", "(pending)".yellow()),
        _ => String::new(),
    };
    println!("{}{}{}: {}", prefix.dimmed(), role, marker, message.content);
}

/// Send text and print the assistant's reply
pub async fn send_message(store: &OfflineChatStore, chat_id: &str, text: &str) -> Result<()> {
    match store.send_message(chat_id, text).await {
        Ok(reply) => {
            println!("{}", reply);
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                "Message kept locally and marked as failed. See `chatdroid chats failed`.".yellow()
            );
            Err(e.into())
        }
    }
}

/// Refresh the cached chat list once
pub async fn sync(store: &OfflineChatStore) -> Result<()> {
    let count = store.refresh_chats().await?;
    println!("{}", format!("Synced {} chats", count).green());
    Ok(())
}

pub async fn new_chat(store: &OfflineChatStore, title: Option<&str>) -> Result<()> {
    match store.create_chat(title).await {
        Ok(chat) => {
            println!("{}", format!("Created chat {} ({})", chat.id, chat.title).green());
            Ok(())
        }
        Err(ChatDroidError::OfflineFallback { local_id, reason }) => {
            println!(
                "{}",
                format!("Server unreachable ({}); created local chat {}", reason, local_id).yellow()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_chat(store: &OfflineChatStore, chat_id: &str) -> Result<()> {
    store.delete_chat(chat_id).await?;
    println!("{}", format!("Deleted chat {}", chat_id).green());
    Ok(())
}

/// Search cached chat titles
pub async fn search_chats(store: &OfflineChatStore, query: &str) -> Result<()> {
    let chats = store.search_chats(query).await?;
    if chats.is_empty() {
        println!("{}", format!("No cached chats match '{}'.", query).yellow());
        return Ok(());
    }
    for chat in chats {
        println!("{}  {}", chat.id.cyan(), chat.title);
    }
    Ok(())
}

pub async fn toggle_pin(store: &OfflineChatStore, chat_id: &str) -> Result<()> {
    let chat = store.toggle_pin(chat_id).await?;
    print_flag(&chat, "pinned", chat.pinned);
    Ok(())
}

pub async fn toggle_archive(store: &OfflineChatStore, chat_id: &str) -> Result<()> {
    let chat = store.toggle_archive(chat_id).await?;
    print_flag(&chat, "archived", chat.archived);
    Ok(())
}

fn print_flag(chat: &CachedChat, flag: &str, value: bool) {
    let state = if value {
        flag.to_string()
    } else {
        format!("un{}", flag)
    };
    println!("{}", format!("Chat {} {}", chat.id, state).green());
}

/// List messages whose send failed
pub async fn failed_messages(store: &OfflineChatStore, chat_id: &str) -> Result<()> {
    let failed = store.failed_messages(chat_id).await?;
    if failed.is_empty() {
        println!("{}", "No failed messages.".green());
        return Ok(());
    }
    for message in failed {
        println!(
            "{}  [{}] {}",
            message.id.red(),
            format_timestamp(message.timestamp),
            message.content
        );
    }
    Ok(())
}
