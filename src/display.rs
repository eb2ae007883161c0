//! Colored terminal output for the one-shot CLI modes.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::extract::Candidate;
use crate::notifier::{DeliveryOutcome, DeliveryReport};
use crate::watcher::WatchTarget;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to at most `max_len` characters, adding an ellipsis
/// if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Print the tunnel URLs found in one file.
pub fn print_extract_results(path: &Path, candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!(
            "{} No tunnel URLs found in {}",
            "[EXTRACT]".yellow().bold(),
            path.display()
        );
        return;
    }

    println!(
        "{} Found {} tunnel URL(s) in {}",
        "[EXTRACT]".green().bold(),
        candidates.len(),
        path.display()
    );
    for (i, candidate) in candidates.iter().enumerate() {
        println!(
            "  {}. {} {}",
            i + 1,
            candidate.url.cyan(),
            format!("(line {}, {})", candidate.line_number, candidate.shape).dimmed()
        );
        println!("     {}", truncate(candidate.line.trim(), 100).dimmed());
    }
    let _ = io::stdout().flush();
}

/// Print the outcome of a test notification per endpoint.
pub fn print_delivery_reports(reports: &[DeliveryReport]) {
    if reports.is_empty() {
        println!("{} No webhook endpoints configured", "[WEBHOOK]".yellow().bold());
        return;
    }
    for report in reports {
        let tag = match report.outcome {
            DeliveryOutcome::Delivered { .. } => "[OK]".green().bold().to_string(),
            DeliveryOutcome::Cancelled { .. } => "[SKIP]".yellow().bold().to_string(),
            DeliveryOutcome::Rejected { .. } | DeliveryOutcome::Exhausted { .. } => {
                "[FAIL]".red().bold().to_string()
            }
        };
        println!(
            "{} {} {} {}",
            timestamp().dimmed(),
            tag,
            report.endpoint.cyan(),
            report.outcome
        );
    }
    let _ = io::stdout().flush();
}

/// Print the watch scope at startup.
pub fn print_watch_start(targets: &[WatchTarget], endpoints: usize, shorteners: usize) {
    println!(
        "{} {} {} endpoint(s), {} shortener(s)",
        timestamp().dimmed(),
        "[WATCH]".blue().bold(),
        endpoints,
        shorteners
    );
    for target in targets {
        let mode = if target.recursive { "recursive" } else { "flat" };
        println!("  {} {}", target.directory.display(), format!("({mode})").dimmed());
    }
    let _ = io::stdout().flush();
}

/// Print where a default configuration was written.
pub fn print_config_written(path: &Path) {
    println!(
        "{} Wrote default configuration to {}",
        "[INIT]".green().bold(),
        path.display().cyan()
    );
}
