//! Terminal rendering shared by the command handlers

use anyhow::{Context, Result};
use colored::*;
use insights_admin::cascade::CascadeSummary;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{}", text);
    Ok(())
}

pub fn print_created(kind: &str, id: &str) {
    println!("{} Created {} {}", "✓".bright_green().bold(), kind, id.bright_green().bold());
}

pub fn print_updated(kind: &str, id: &str) {
    println!("{} Updated {} {}", "✓".bright_green().bold(), kind, id.bright_green().bold());
}

pub fn print_deleted(kind: &str, id: &str, summary: Option<&CascadeSummary>) {
    println!("{} Deleted {} {}", "✓".bright_green().bold(), kind, id.bright_green().bold());
    if let Some(summary) = summary {
        println!(
            "  {}",
            format!(
                "{} removed, {} updated in {} batch(es)",
                summary.deleted, summary.updated, summary.chunks
            )
            .dimmed()
        );
    }
}

pub fn print_empty(what: &str) {
    println!("  {}", format!("No {} found", what).bright_yellow().bold());
}

pub fn print_heading(title: &str) {
    println!();
    println!("  {}", title.bright_white().bold());
}

/// Fixed-width columns sized to the widest cell
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<width$}", h, width = w))
        .collect::<Vec<_>>()
        .join("  ");
    println!("  {}", header_line.bright_white().bold());
    println!("  {}", "-".repeat(header_line.len()).dimmed());

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {}", line);
    }
    println!();
}

pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
