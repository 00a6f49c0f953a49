//! Cache maintenance commands

use colored::Colorize;

use crate::error::Result;
use crate::repository::OfflineChatStore;

pub async fn stats(store: &OfflineChatStore) -> Result<()> {
    let stats = store.stats().await?;
    println!("Cache: {}", store.cache().db_path().display());
    println!("  chats:           {}", stats.chats);
    println!("  messages:        {}", stats.messages);
    println!("  attachments:     {}", stats.attachments);
    if stats.failed_messages > 0 {
        println!(
            "  failed messages: {}",
            stats.failed_messages.to_string().red()
        );
    } else {
        println!("  failed messages: 0");
    }
    Ok(())
}

pub async fn clear(store: &OfflineChatStore) -> Result<()> {
    store.clear_all().await?;
    println!("{}", "Local cache cleared".green());
    Ok(())
}
