//! Model listing

use prettytable::{cell, row, Table};

use super::truncate;
use crate::api::{ChatApi, ModelInfo};
use crate::error::Result;

/// List models available on the server
///
/// # Examples
///
/// ```no_run
/// use chatdroid::api::OpenWebUiClient;
/// use chatdroid::commands::models::list_models;
/// use chatdroid::config::ServerConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = OpenWebUiClient::new(&ServerConfig::default())?;
/// list_models(&client, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(api: &dyn ChatApi, json: bool) -> Result<()> {
    let models = api.list_models().await?;
    tracing::debug!("Listing {} models", models.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }

    println!("\nAvailable models:\n");
    models_table(&models).printstd();
    println!();
    Ok(())
}

fn models_table(models: &[ModelInfo]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Model", "Name", "Owner", "Description"]);
    for model in models {
        table.add_row(row![
            model.id,
            model.name.as_deref().unwrap_or("-"),
            model.owned_by.as_deref().unwrap_or("-"),
            truncate(model.description().unwrap_or("-"), 50)
        ]);
    }
    table
}
