//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use fxt_e2e::{TestSuiteResult, VariantResult};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

const HEADERS: [&str; 6] = ["Variant", "Channel", "Status", "Started", "Duration", "Error"];

fn result_row(result: &VariantResult) -> Vec<String> {
    let status = if result.success {
        "PASS".green().to_string()
    } else {
        "FAIL".red().bold().to_string()
    };
    let started = chrono::DateTime::parse_from_rfc3339(&result.started_at)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| result.started_at.clone());

    vec![
        result.variant.label().to_string(),
        result.channel.to_string(),
        status,
        started,
        format_duration(result.duration_ms),
        result.error.clone().unwrap_or_default(),
    ]
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    match secs {
        0 => format!("{ms}ms"),
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}

/// Print per-variant results
pub fn print_results(results: &[VariantResult], format: OutputFormat) {
    if results.is_empty() {
        println!("No variants ran.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(HEADERS);
            for result in results {
                table.add_row(result_row(result));
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, result) in results.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                for (header, value) in HEADERS.iter().zip(result_row(result)) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print the results of a run followed by a one-line summary
pub fn print_suite(suite: &TestSuiteResult, format: OutputFormat) {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(suite).unwrap_or_default());
        return;
    }

    print_results(&suite.results, format);
    let line = format!(
        "{} passed, {} failed, {} skipped in {}",
        suite.passed,
        suite.failed,
        suite.skipped,
        format_duration(suite.duration_ms)
    );
    if suite.success() {
        print_success(&line);
    } else {
        print_warning(&line);
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
    println!("⚠️  {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
