//! Main test runner that sequences variants and records their results

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use fxt_common::{Channel, MachStage, Variant};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::E2eConfig;
use crate::error::{E2eError, E2eResult};
use crate::pipeline::Pipeline;
use crate::process::{ProcessRunner, SystemRunner};

/// Message shown when the tool is started outside the extension repository
pub const ROOT_PRECONDITION: &str = "This script is intended to be executed from the root folder.";

/// Result of running a single variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant: Variant,
    pub channel: Channel,
    pub success: bool,
    pub started_at: String,
    pub duration_ms: u64,
    /// Browser toolchain step that failed, if it got that far
    pub failed_stage: Option<MachStage>,
    pub error: Option<String>,
}

/// Result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub channel: Channel,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Variants never started because an earlier one failed
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<VariantResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Runs the pipeline once per variant, stopping at the first failure
pub struct TestRunner<R: ProcessRunner = SystemRunner> {
    config: E2eConfig,
    channel: Channel,
    root: PathBuf,
    process: R,
    results: Vec<VariantResult>,
}

impl TestRunner<SystemRunner> {
    /// Create a runner that executes commands on the host
    pub fn new(config: E2eConfig, channel: Channel, root: impl Into<PathBuf>) -> Self {
        Self::with_runner(config, channel, root, SystemRunner::new())
    }
}

impl<R: ProcessRunner> TestRunner<R> {
    pub fn with_runner(
        config: E2eConfig,
        channel: Channel,
        root: impl Into<PathBuf>,
        process: R,
    ) -> Self {
        Self {
            config,
            channel,
            root: root.into(),
            process,
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Results recorded so far, including a failed variant
    pub fn results(&self) -> &[VariantResult] {
        &self.results
    }

    /// Fail unless the root marker exists under the repository root
    pub fn check_root(&self) -> E2eResult<()> {
        if !self.root.join(&self.config.root_marker).exists() {
            return Err(E2eError::Precondition(ROOT_PRECONDITION.to_string()));
        }
        Ok(())
    }

    /// Variants run when none are requested explicitly
    pub fn default_variants(&self) -> Vec<Variant> {
        self.config.profile(self.channel).variants.clone()
    }

    /// Run the channel profile's variants
    pub fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let variants = self.default_variants();
        self.run_variants(&variants)
    }

    /// Run the given variants in order
    pub fn run_variants(&mut self, variants: &[Variant]) -> E2eResult<TestSuiteResult> {
        self.check_root()?;
        let start = Instant::now();
        self.results.clear();

        info!(
            "Running {} variant(s) against {}...",
            variants.len(),
            self.channel
        );

        for &variant in variants {
            let result = self.run_variant(variant)?;
            info!("✓ {} ({} ms)", variant, result.duration_ms);
        }

        let suite = self.summary(variants.len(), start.elapsed().as_millis() as u64);
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );
        Ok(suite)
    }

    /// Run one variant end to end, recording its result
    pub fn run_variant(&mut self, variant: Variant) -> E2eResult<VariantResult> {
        info!("****** Test with {} ******", variant.label());
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();

        let outcome = Pipeline::new(&self.config, self.channel, &self.root, &mut self.process)
            .run(variant);

        let mut result = VariantResult {
            variant,
            channel: self.channel,
            success: outcome.is_ok(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            failed_stage: None,
            error: None,
        };

        match outcome {
            Ok(()) => {
                self.results.push(result.clone());
                Ok(result)
            }
            Err(e) => {
                error!("✗ {} - {}", variant, e);
                if let E2eError::MachFailed { stage, .. } = &e {
                    result.failed_stage = Some(*stage);
                }
                result.error = Some(e.to_string());
                self.results.push(result);
                Err(e)
            }
        }
    }

    /// Summarise recorded results; variants not recorded count as skipped
    pub fn summary(&self, planned: usize, duration_ms: u64) -> TestSuiteResult {
        let passed = self.results.iter().filter(|r| r.success).count();
        let failed = self.results.len() - passed;
        TestSuiteResult {
            channel: self.channel,
            total: planned,
            passed,
            failed,
            skipped: planned.saturating_sub(self.results.len()),
            duration_ms,
            results: self.results.clone(),
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        let dir = self.root.join(&self.config.results_dir);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
