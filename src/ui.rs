use colored::Colorize;
use executor::{ExecutionFailure, Observer, RunReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Pipeline Output
// ============================================================================

/// Live progress of a pipeline run
pub struct UiObserver {
    quiet: bool,
}

impl UiObserver {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Observer for UiObserver {
    fn on_group_start(&self, kinds: &[String], count: usize) {
        if !self.quiet {
            println!(
                "{} {} ({})",
                "→".blue().bold(),
                kinds.join(", "),
                count
            );
        }
    }

    fn on_success(&self, name: &str) {
        if !self.quiet {
            println!("  {} {}", "✓".green(), name);
        }
    }

    fn on_warning(&self, failure: &ExecutionFailure) {
        println!("  {} {}", "⚠".yellow(), failure);
    }

    fn on_failure(&self, failure: &ExecutionFailure) {
        eprintln!("  {} {}", "✗".red(), failure);
    }

    fn on_skipped(&self, name: &str) {
        if !self.quiet {
            println!("  {} {} {}", "○".dimmed(), name, "(skipped)".dimmed());
        }
    }
}

/// One-line outcome of a run
pub fn summary_line(report: &RunReport) -> String {
    let mut parts = vec![
        format!("{} succeeded", report.succeeded.len()),
        format!("{} failed", report.failed.len()),
    ];
    if !report.warnings.is_empty() {
        parts.push(format!("{} not found", report.warnings.len()));
    }
    if !report.skipped.is_empty() {
        parts.push(format!("{} skipped", report.skipped.len()));
    }
    parts.join(", ")
}

/// Print the outcome of a run, itemizing failures
pub fn summary(verb: &str, report: &RunReport) {
    println!();
    let line = format!("{}: {}", verb, summary_line(report));
    if report.is_success() {
        success(&line);
    } else {
        error(&line);
        for failure in report.failed.iter() {
            eprintln!("    {}", failure.to_string().red());
        }
    }
}

// ============================================================================
// Size Formatting
// ============================================================================

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
