//! Settings commands

use colored::Colorize;
use prettytable::{cell, row, Table};

use crate::config::Config;
use crate::error::Result;
use crate::preferences::{AppPreferences, AppSettings};

pub fn show(prefs: &AppPreferences, config: &Config) {
    let settings = prefs.get();
    settings_table(&settings, config).printstd();
    println!("Stored in {}", prefs.path().display());
}

fn settings_table(settings: &AppSettings, config: &Config) -> Table {
    let model = match &settings.default_model {
        Some(model) => model.clone(),
        None => format!("{} (config)", config.chat.default_model),
    };

    let mut table = Table::new();
    table.add_row(row!["Setting", "Value"]);
    table.add_row(row!["default_model", model]);
    table.add_row(row!["max_tokens", settings.max_tokens]);
    table.add_row(row!["temperature", settings.temperature]);
    table.add_row(row!["show_timestamps", settings.show_timestamps]);
    table.add_row(row!["telemetry", settings.telemetry_enabled]);
    table
}

/// Change one setting and persist it
pub fn set(prefs: &AppPreferences, key: &str, value: &str) -> Result<()> {
    let mut updated = prefs.get();
    updated.set(key, value)?;
    prefs.update(|settings| *settings = updated)?;
    println!("{}", format!("Set {} = {}", key, value).green());
    Ok(())
}
