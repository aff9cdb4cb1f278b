//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use suiterun_common::{StreamEvent, TestReport, TestResult};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format (one event per line while streaming)
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            table.add_row(item.row());

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item).unwrap_or_default());
        }
    }
}

/// Print a list of items as a table
pub fn print_table<T: TableDisplay>(items: &[T]) {
    if items.is_empty() {
        println!("No tests found.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }

    println!("{table}");
}

impl TableDisplay for TestResult {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Outcome", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        let error = self
            .error
            .as_deref()
            .and_then(|e| e.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or("")
            .trim()
            .to_string();

        vec![
            self.id.clone(),
            self.outcome.to_string(),
            format!("{:.2}s", self.duration_seconds),
            error,
        ]
    }
}

/// Print a normalized report
pub fn print_report(report: &TestReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_table(&report.tests);
            println!("{}", summary_line(report));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
    }
}

fn summary_line(report: &TestReport) -> String {
    let s = &report.summary;
    let passed = format!("{} passed", s.passed).green();
    let failed = if s.failed > 0 {
        format!("{} failed", s.failed).red().bold()
    } else {
        format!("{} failed", s.failed).normal()
    };
    let skipped = format!("{} skipped", s.skipped).yellow();
    format!(
        "{} total: {}, {}, {} in {:.2}s",
        s.total, passed, failed, skipped, s.duration_seconds
    )
}

/// Print one event as it arrives
pub fn print_event(event: &StreamEvent, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(event).unwrap_or_default());
        return;
    }

    match event {
        StreamEvent::Status(message) => println!("{} {}", "▶".cyan(), message.bold()),
        StreamEvent::Log(chunk) => {
            println!("{} {}", format!("[{}]", chunk.phase).dimmed(), chunk.chunk)
        }
        StreamEvent::Report(report) => {
            println!();
            print_report(report, format);
        }
        StreamEvent::Complete(done) if done.exit_code == 0 => {
            print_success("Test suite passed");
        }
        StreamEvent::Complete(done) => {
            print_error(&format!("Test suite exited with code {}", done.exit_code));
        }
        StreamEvent::Error(failure) => print_error(&failure.message),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message);
}
