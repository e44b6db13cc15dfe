//! fxt-e2e - Main Entry Point
//!
//! Runs the Firefox Translations browser-chrome test against a freshly
//! cloned Firefox tree, once per gemm variant.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use fxt_common::{Channel, Variant};
use fxt_e2e::{E2eConfig, E2eError, TestRunner, TestSuiteResult};

mod output;

/// Config file picked up from the repository root when present
const DEFAULT_CONFIG: &str = "fxt-e2e.toml";

/// Firefox Translations end-to-end test driver
#[derive(Parser)]
#[command(name = "fxt-e2e")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Browser channel: release (mozilla-central) or esr102
    #[arg(default_value = "release")]
    channel: Channel,

    /// Variant to run; repeat to run several (default: the channel's list)
    #[arg(long = "variant", value_name = "VARIANT")]
    variants: Vec<Variant>,

    /// Configuration file, relative to the repository root [default: fxt-e2e.toml]
    #[arg(long, env = "FXT_E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for test-results.json
    #[arg(long)]
    results: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(suite) if suite.success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(err) => report_failure(&err),
    }
}

fn run(cli: &Cli) -> anyhow::Result<TestSuiteResult> {
    let root = std::env::current_dir().context("Failed to read the working directory")?;

    let mut config = load_config(&root, cli.config.as_deref())?;
    if let Some(results) = &cli.results {
        config.results_dir = results.clone();
    }

    let mut runner = TestRunner::new(config, cli.channel, &root);
    runner.check_root()?;

    let variants = if cli.variants.is_empty() {
        runner.default_variants()
    } else {
        cli.variants.clone()
    };
    output::print_info(&format!(
        "Testing {} on {}",
        variants
            .iter()
            .map(|v| v.label())
            .collect::<Vec<_>>()
            .join(", "),
        cli.channel
    ));

    let start = Instant::now();

    // Record whatever ran, including the failing variant
    let (suite, failure) = match runner.run_variants(&variants) {
        Ok(suite) => (suite, None),
        Err(e) => (
            runner.summary(variants.len(), start.elapsed().as_millis() as u64),
            Some(e),
        ),
    };
    runner
        .write_results(&suite)
        .context("Failed to write test results")?;
    output::print_suite(&suite, cli.format);

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(suite),
    }
}

/// Load the explicit config file, or the default one when it exists
fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<E2eConfig> {
    let path = match explicit {
        Some(path) => {
            let path = root.join(path);
            if !path.is_file() {
                bail!("Config file {} does not exist", path.display());
            }
            path
        }
        None => root.join(DEFAULT_CONFIG),
    };
    E2eConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// What to print for a failed run, and the exit code
#[derive(Debug)]
struct FailureReport {
    code: u8,
    /// Output of the failing command, printed before the message
    captured: Option<String>,
    message: String,
}

fn failure_report(err: &anyhow::Error) -> FailureReport {
    let e2e = err.downcast_ref::<E2eError>();
    let captured = e2e.and_then(E2eError::captured_output).map(str::to_string);

    match e2e {
        Some(failure @ E2eError::MachFailed { .. }) => FailureReport {
            code: 1,
            captured,
            message: failure.to_string(),
        },
        _ => FailureReport {
            code: 2,
            captured,
            message: format!("{err:#}"),
        },
    }
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    let report = failure_report(err);
    if let Some(captured) = &report.captured {
        println!("{captured}");
    }
    output::print_error(&report.message);
    ExitCode::from(report.code)
}
