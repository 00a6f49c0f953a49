//! File commands

use std::path::Path;

use colored::Colorize;
use prettytable::{format, Table};
use tokio_stream::StreamExt;

use super::{format_timestamp, truncate};
use crate::api::FileInfo;
use crate::error::{ChatDroidError, Result};
use crate::file_utils::format_file_size;
use crate::repository::{FileRepository, UploadProgress};

/// Upload a file, printing each progress step
pub async fn upload(files: &FileRepository, path: &Path) -> Result<()> {
    let mut progress = files.upload(path);
    while let Some(step) = progress.next().await {
        match step {
            UploadProgress::Starting => println!("Preparing {}", path.display()),
            UploadProgress::Uploading(percent) => println!("Uploading... {}%", percent),
            UploadProgress::Success(response) => {
                println!(
                    "{}",
                    format!(
                        "Uploaded {} as {} ({})",
                        response.filename,
                        response.id,
                        format_file_size(response.meta.size.max(0) as u64)
                    )
                    .green()
                );
                return Ok(());
            }
            UploadProgress::Error(message) => {
                return Err(ChatDroidError::File(message).into());
            }
        }
    }
    Err(ChatDroidError::File("Upload ended without a result".to_string()).into())
}

pub async fn list(files: &FileRepository, json: bool) -> Result<()> {
    let entries = files.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", "No files uploaded.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Name".bold(),
        "Type".bold(),
        "Size".bold(),
        "Created".bold()
    ]);
    for file in &entries {
        table.add_row(prettytable::row![
            file.id.cyan(),
            truncate(&file.filename, 40),
            file.meta.content_type.as_deref().unwrap_or("-"),
            format_file_size(file.meta.size.max(0) as u64),
            format_timestamp(file.created_at)
        ]);
    }
    table.printstd();
    Ok(())
}

pub async fn info(files: &FileRepository, file_id: &str) -> Result<()> {
    let file = files.get(file_id).await?;
    print_info(&file);
    Ok(())
}

fn print_info(file: &FileInfo) {
    println!("{}  {}", "ID:".bold(), file.id);
    println!("{}  {}", "Name:".bold(), file.filename);
    println!(
        "{}  {}",
        "Type:".bold(),
        file.meta.content_type.as_deref().unwrap_or("unknown")
    );
    println!(
        "{}  {}",
        "Size:".bold(),
        format_file_size(file.meta.size.max(0) as u64)
    );
    println!("{}  {}", "Created:".bold(), format_timestamp(file.created_at));
}

pub async fn delete(files: &FileRepository, file_id: &str) -> Result<()> {
    files.delete(file_id).await?;
    println!("{}", format!("Deleted file {}", file_id).green());
    Ok(())
}

pub async fn download(files: &FileRepository, file_id: &str, output: &Path) -> Result<()> {
    let written = files.download(file_id, output).await?;
    println!(
        "{}",
        format!(
            "Saved {} to {}",
            format_file_size(written),
            output.display()
        )
        .green()
    );
    Ok(())
}
