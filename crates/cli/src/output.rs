//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use fleet_lib::{LifecycleState, Verdict};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows whose columns are only known at runtime; the first row is the header
pub fn print_rows(rows: Vec<Vec<String>>) {
    if rows.len() <= 1 {
        println!("{}", "No instances selected".yellow());
        return;
    }
    let mut builder = Builder::default();
    for row in rows {
        builder.push_record(row);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render items as a rounded table
pub fn render_table<T: Tabled>(items: &[T]) -> String {
    Table::new(items).with(Style::rounded()).to_string()
}

pub fn success_line(message: &str) -> String {
    format!("{} {}", "✓".green().bold(), message)
}

pub fn error_line(message: &str) -> String {
    format!("{} {}", "✗".red().bold(), message)
}

pub fn warning_line(message: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), message)
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{}", success_line(message));
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{}", error_line(message));
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{}", warning_line(message));
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a utilization percentage
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Color a verdict: reclaim stands out, retain is quiet
pub fn color_verdict(verdict: Verdict) -> String {
    let text = verdict.to_string();
    match verdict {
        Verdict::Retain => text.green().to_string(),
        Verdict::Reclaim => text.red().bold().to_string(),
    }
}

pub fn color_state(state: &LifecycleState) -> String {
    let text = state.as_str();
    match state {
        LifecycleState::Running => text.green().to_string(),
        LifecycleState::Pending | LifecycleState::Stopping | LifecycleState::ShuttingDown => {
            text.yellow().to_string()
        }
        LifecycleState::Stopped | LifecycleState::Terminated => text.red().to_string(),
        LifecycleState::Other(_) => text.to_string(),
    }
}

/// Color a mean utilization relative to the reclaim threshold
pub fn color_utilization(value: f64, threshold: f64) -> String {
    let formatted = format_percent(value);
    if value < threshold {
        formatted.red().to_string()
    } else if value < threshold + 15.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
