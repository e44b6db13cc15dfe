//! The per-variant pipeline: reset, build, clone, inject, patch, configure,
//! mutate, then build and test with the browser's own driver.

use std::fs;
use std::path::{Path, PathBuf};

use fxt_common::artifact::{self, join_relative};
use fxt_common::splice::{self, CallSite};
use fxt_common::{
    read_manifest_version, Channel, EngineRegistry, ExtractionReport, MachStage, Variant,
};
use tracing::{debug, info};

use crate::config::{ChannelProfile, E2eConfig, EngineSource, GluePatch};
use crate::error::{E2eError, E2eResult};
use crate::process::{run_checked, CommandSpec, ProcessRunner};
use crate::tree::TreeLayout;

pub struct Pipeline<'a, R: ProcessRunner + ?Sized> {
    config: &'a E2eConfig,
    profile: &'a ChannelProfile,
    root: &'a Path,
    layout: TreeLayout,
    runner: &'a mut R,
}

impl<'a, R: ProcessRunner + ?Sized> Pipeline<'a, R> {
    pub fn new(config: &'a E2eConfig, channel: Channel, root: &'a Path, runner: &'a mut R) -> Self {
        let profile = config.profile(channel);
        Self {
            config,
            profile,
            root,
            layout: TreeLayout::new(root.join(&profile.tree_dir)),
            runner,
        }
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Run every step for one variant; the first failure aborts
    pub fn run(&mut self, variant: Variant) -> E2eResult<()> {
        self.reset_environment()?;
        self.build_artifact()?;
        let version = self.extension_version()?;
        self.acquire_source()?;
        self.inject_artifact()?;
        self.provision_engine()?;
        self.patch_sources(&version)?;
        self.configure_build()?;
        self.apply_variant(variant)?;
        self.build_and_test(variant)
    }

    /// Delete any previous checkout
    pub fn reset_environment(&self) -> E2eResult<()> {
        let tree = self.layout.root();
        if tree.exists() {
            info!("Removing previous checkout {}", tree.display());
            fs::remove_dir_all(tree)?;
        }
        Ok(())
    }

    /// Build the packaged extension
    pub fn build_artifact(&mut self) -> E2eResult<()> {
        if let Some(settings) = &self.profile.settings_override {
            let from = self.root.join(&settings.from);
            let to = self.root.join(&settings.to);
            debug!("Copying {} over {}", from.display(), to.display());
            fs::copy(&from, &to)?;
        }

        let build = CommandSpec::from_argv(&self.profile.build_command, self.root)
            .ok_or_else(|| E2eError::Config("build_command must not be empty".to_string()))?;
        run_checked(&mut *self.runner, &build)?;

        let xpi = self.root.join(&self.config.extension.artifact);
        if !xpi.is_file() {
            return Err(E2eError::Precondition(format!(
                "Build did not produce {}",
                xpi.display()
            )));
        }
        Ok(())
    }

    /// Version from the extension manifest
    pub fn extension_version(&self) -> E2eResult<String> {
        let manifest = self.root.join(&self.config.extension.manifest);
        Ok(read_manifest_version(&manifest)?)
    }

    /// Clone the browser tree and check out the channel's branch
    pub fn acquire_source(&mut self) -> E2eResult<()> {
        let clone = CommandSpec::new("git", self.root)
            .arg("clone")
            .arg(self.profile.clone_url.as_str())
            .arg(self.profile.tree_dir.to_string_lossy());
        run_checked(&mut *self.runner, &clone)?;

        if let Some(branch) = &self.profile.checkout {
            let checkout = CommandSpec::new("git", self.layout.root())
                .arg("checkout")
                .arg(branch.as_str());
            run_checked(&mut *self.runner, &checkout)?;
        }
        Ok(())
    }

    /// Unpack the extension into the tree and copy the test fixtures
    pub fn inject_artifact(&self) -> E2eResult<ExtractionReport> {
        let extension_dir = self.layout.extension_dir();
        if extension_dir.exists() {
            fs::remove_dir_all(&extension_dir)?;
        }
        let xpi = self.root.join(&self.config.extension.artifact);
        let report = artifact::extract_zip(&xpi, &extension_dir)?;
        info!(
            "Unpacked {} files into {}",
            report.files,
            extension_dir.display()
        );

        let fixtures = &self.config.fixtures;
        let source = self.root.join(&fixtures.source_dir);
        let test_dir = self.layout.test_dir();
        fs::create_dir_all(&test_dir)?;

        for file in fixtures.files.iter().chain(&self.profile.extra_fixtures) {
            artifact::copy_into(&source.join(file), &test_dir)?;
        }
        for dir in &fixtures.dirs {
            artifact::copy_dir_all(&source.join(dir), &test_dir.join(dir))?;
        }
        Ok(report)
    }

    /// Put the translation engine where the test page loads it from
    pub fn provision_engine(&mut self) -> E2eResult<PathBuf> {
        let test_dir = self.layout.test_dir();
        match &self.profile.engine {
            EngineSource::Download => {
                let registry_path = self.root.join(&self.config.extension.engine_registry);
                let registry = EngineRegistry::load(&registry_path)?;
                let dest = test_dir.join(&registry.file_name);

                let download = CommandSpec::new("curl", self.root)
                    .args(["-L", "--fail", "-o"])
                    .arg(dest.to_string_lossy())
                    .arg(registry.download_url());
                run_checked(&mut *self.runner, &download)?;

                match &registry.sha256 {
                    Some(expected) => artifact::verify_sha256(&dest, expected)?,
                    None => debug!("No checksum listed for {}", registry.file_name),
                }
                Ok(dest)
            }
            EngineSource::CopyFromExtension { dir } => {
                let source = join_relative(&self.layout.extension_dir(), dir)?;
                let name = source.file_name().ok_or_else(|| {
                    E2eError::Config(format!("engine dir '{}' has no name", dir.display()))
                })?;
                let dest = test_dir.join(name);
                let copied = artifact::copy_dir_all(&source, &dest)?;
                debug!("Copied {} engine files into {}", copied, dest.display());
                Ok(dest)
            }
        }
    }

    /// Register the extension with the browser and stamp its version
    pub fn patch_sources(&self, version: &str) -> E2eResult<()> {
        if self.profile.register_extension_dir {
            splice::append_lines(
                &self.layout.extensions_moz_build(),
                &["DIRS += [ ", "    \"translations\", ", "] "],
            )?;
        }

        let glue = self.layout.browser_glue();
        match &self.profile.glue {
            GluePatch::VersionLine { marker } => {
                let stamp = format!("            \"{version}\",");
                splice::patch_file(&glue, |text| {
                    splice::replace_line_before(text, marker, &stamp)
                })?;
            }
            GluePatch::Splice {
                template,
                placeholder,
                anchor,
                call_site_marker,
                call_line,
                renames,
            } => {
                let template = fs::read_to_string(self.root.join(template))?;
                let block = splice::fill_template(
                    &template,
                    placeholder,
                    &format!("\"{version}\""),
                    renames,
                );
                let call_site = CallSite {
                    marker: call_site_marker,
                    line: call_line,
                };
                splice::patch_file(&glue, |text| {
                    splice::splice_before_anchor(text, anchor, &block, Some(call_site))
                })?;
            }
        }
        info!("Patched {} for version {}", glue.display(), version);
        Ok(())
    }

    /// Write `mozconfig` and register the test manifest
    pub fn configure_build(&self) -> E2eResult<()> {
        let mozconfig: String = self
            .config
            .mach
            .mozconfig_options
            .iter()
            .map(|opt| format!("ac_add_options {opt}\n"))
            .collect();
        fs::write(self.layout.mozconfig(), mozconfig)?;

        let manifest = format!(
            "BROWSER_CHROME_MANIFESTS += [\"{}\"]",
            self.config.mach.chrome_manifest
        );
        splice::append_lines(&self.layout.translations_moz_build(), &[manifest.as_str()])?;
        Ok(())
    }

    /// Force the engine path the variant exercises
    pub fn apply_variant(&self, variant: Variant) -> E2eResult<()> {
        let gemm = &self.config.gemm;
        if variant.disables_native_gemm() {
            if self.profile.native_gemm {
                let worker = join_relative(self.layout.root(), &gemm.worker_script)?;
                let count = splice::rewrite_token_in_file(&worker, &gemm.native_token)?;
                info!(
                    "Disabled {} occurrence(s) of {} in {}",
                    count,
                    gemm.native_token,
                    worker.display()
                );
            } else {
                info!("No native gemm on this channel, {} runs unmodified", variant.label());
            }
        }
        if variant.forces_arm() {
            let script = join_relative(self.layout.root(), &gemm.platform_script)?;
            let line = gemm.arch_override_line();
            splice::patch_file(&script, |text| {
                splice::insert_after(text, &gemm.platform_marker, &line)
            })?;
            info!("Forced architecture '{}' in {}", gemm.forced_arch, script.display());
        }
        Ok(())
    }

    /// `mach build` then `mach test`, failing with the captured output
    pub fn build_and_test(&mut self, variant: Variant) -> E2eResult<()> {
        let tree = self.layout.root().to_path_buf();
        let mach = tree
            .join(&self.config.mach.program)
            .to_string_lossy()
            .into_owned();

        info!("Building {}", tree.display());
        let build = CommandSpec::new(mach.as_str(), &tree).arg("build");
        self.run_mach(&build, variant, MachStage::Build)?;

        info!("Running test with {}", variant.label());
        let test = CommandSpec::new(mach.as_str(), &tree)
            .arg("test")
            .args(self.profile.test_prefs.iter().map(|p| format!("--setpref={p}")))
            .arg(self.config.mach.test_path.as_str());
        self.run_mach(&test, variant, MachStage::Test)?;

        info!("Test with {} Succeeded", variant.label());
        Ok(())
    }

    fn run_mach(&mut self, spec: &CommandSpec, variant: Variant, stage: MachStage) -> E2eResult<()> {
        info!("$ {}", spec);
        let output = self.runner.run(spec)?;
        if !output.success() {
            return Err(E2eError::MachFailed {
                variant,
                stage,
                code: output.code,
                output: output.output,
            });
        }
        Ok(())
    }
}
