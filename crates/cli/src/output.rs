//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Format a duration in milliseconds with a heat color against a limit
pub fn color_duration(value_ms: f64, limit_ms: f64) -> String {
    let formatted = format!("{:.3} ms", value_ms);
    if value_ms > limit_ms {
        formatted.red().to_string()
    } else if value_ms > limit_ms * 0.8 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color an enabled/disabled flag
pub fn color_enabled(enabled: bool) -> String {
    if enabled {
        "enabled".green().to_string()
    } else {
        "disabled".red().to_string()
    }
}
