//! Run configuration
//!
//! Every section has defaults matching the Firefox Translations repository
//! layout, so a config file is only needed to override paths or commands.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use fxt_common::{Channel, Variant};

use crate::error::{E2eError, E2eResult};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// File that must exist relative to the working directory
    pub root_marker: PathBuf,

    /// Where `test-results.json` is written
    pub results_dir: PathBuf,

    pub extension: ExtensionConfig,
    pub fixtures: FixtureConfig,
    pub gemm: GemmConfig,
    pub mach: MachConfig,

    /// mozilla-central profile
    pub release: ChannelProfile,

    /// ESR 102 profile
    pub esr102: ChannelProfile,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            root_marker: PathBuf::from("scripts/tests/browser_translation_test.js"),
            results_dir: PathBuf::from("test-results"),
            extension: ExtensionConfig::default(),
            fixtures: FixtureConfig::default(),
            gemm: GemmConfig::default(),
            mach: MachConfig::default(),
            release: ChannelProfile::release(),
            esr102: ChannelProfile::esr102(),
        }
    }
}

/// Paths inside the extension repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub manifest: PathBuf,
    pub engine_registry: PathBuf,
    /// Packaged extension produced by the build command
    pub artifact: PathBuf,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("extension/manifest.json"),
            engine_registry: PathBuf::from("extension/model/engineRegistry.js"),
            artifact: PathBuf::from("web-ext-artifacts/firefox_translations.xpi"),
        }
    }
}

/// Static test fixtures copied into the browser tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub source_dir: PathBuf,
    /// Files copied on every channel
    pub files: Vec<String>,
    /// Corpus directories copied recursively
    pub dirs: Vec<String>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("scripts/tests"),
            files: vec![
                "browser.ini".to_string(),
                "browser_translation_test.html".to_string(),
                "browser_translation_test.js".to_string(),
            ],
            dirs: vec!["esen".to_string(), "enes".to_string()],
        }
    }
}

/// Where variant mutations are applied, relative to the browser tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GemmConfig {
    /// Worker that links the native gemm when the browser provides it
    pub worker_script: PathBuf,
    pub native_token: String,
    /// Script that reads the platform info
    pub platform_script: PathBuf,
    /// Line after which the architecture override is inserted
    pub platform_marker: String,
    pub arch_field: String,
    pub forced_arch: String,
}

impl Default for GemmConfig {
    fn default() -> Self {
        Self {
            worker_script: PathBuf::from(
                "browser/extensions/translations/extension/controller/translation/WASMTranslationWorker.js",
            ),
            native_token: "mozIntGemm".to_string(),
            platform_script: PathBuf::from(
                "browser/extensions/translations/extension/controller/backgroundScript.js",
            ),
            platform_marker: "platformInfo = await browser.runtime.getPlatformInfo();".to_string(),
            arch_field: "platformInfo.arch".to_string(),
            forced_arch: "arm".to_string(),
        }
    }
}

impl GemmConfig {
    pub fn arch_override_line(&self) -> String {
        format!("    {} = \"{}\";", self.arch_field, self.forced_arch)
    }
}

/// The browser's build and test driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachConfig {
    /// Driver script, relative to the tree root
    pub program: PathBuf,
    pub mozconfig_options: Vec<String>,
    /// Test manifest registered in the translations `moz.build`
    pub chrome_manifest: String,
    /// Test file passed to `mach test`
    pub test_path: String,
}

impl Default for MachConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mach"),
            mozconfig_options: vec!["--enable-artifact-builds".to_string()],
            chrome_manifest: "test/browser/browser.ini".to_string(),
            test_path: "browser/extensions/translations/test/browser/browser_translation_test.js"
                .to_string(),
        }
    }
}

/// Copy a file inside the extension repository before building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsOverride {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// How the translation engine binary reaches the test directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSource {
    /// Download the wasm listed in the engine registry
    Download,
    /// Copy a directory of the unpacked extension
    CopyFromExtension { dir: PathBuf },
}

/// How `BrowserGlue.jsm` is taught about the extension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GluePatch {
    /// Stamp the version on the line before `marker`
    VersionLine { marker: String },
    /// Splice a helper method from a template and call it
    Splice {
        template: PathBuf,
        placeholder: String,
        anchor: String,
        call_site_marker: String,
        call_line: String,
        renames: Vec<(String, String)>,
    },
}

/// Everything that differs between browser channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelProfile {
    /// Checkout directory, relative to the repository root
    pub tree_dir: PathBuf,
    pub clone_url: String,
    #[serde(default)]
    pub checkout: Option<String>,
    pub build_command: Vec<String>,
    #[serde(default)]
    pub settings_override: Option<SettingsOverride>,
    /// Fixture files copied in addition to `fixtures.files`
    #[serde(default)]
    pub extra_fixtures: Vec<String>,
    /// Append the translations directory to `browser/extensions/moz.build`
    #[serde(default)]
    pub register_extension_dir: bool,
    pub engine: EngineSource,
    pub glue: GluePatch,
    /// Prefs passed to `mach test` as `--setpref=`
    #[serde(default)]
    pub test_prefs: Vec<String>,
    /// Whether the browser ships `mozIntGemm`; without it the fallback
    /// gemm is what runs and needs no rewrite
    #[serde(default = "default_native_gemm")]
    pub native_gemm: bool,
    pub variants: Vec<Variant>,
}

fn default_native_gemm() -> bool {
    true
}

impl ChannelProfile {
    pub fn release() -> Self {
        Self {
            tree_dir: PathBuf::from("gecko"),
            clone_url: "hg::https://hg.mozilla.org/mozilla-central".to_string(),
            checkout: None,
            build_command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            settings_override: Some(SettingsOverride {
                from: PathBuf::from("extension/settings/test.js"),
                to: PathBuf::from("extension/settings.js"),
            }),
            extra_fixtures: Vec::new(),
            register_extension_dir: false,
            engine: EngineSource::Download,
            glue: GluePatch::VersionLine {
                marker: "resource://builtin-addons/translations/".to_string(),
            },
            test_prefs: Vec::new(),
            native_gemm: true,
            variants: Variant::ALL.to_vec(),
        }
    }

    pub fn esr102() -> Self {
        Self {
            tree_dir: PathBuf::from("mozilla-esr102"),
            clone_url: "hg::https://hg.mozilla.org/mozilla-unified".to_string(),
            checkout: Some("bookmarks/esr102".to_string()),
            build_command: vec![
                "npm".to_string(),
                "run".to_string(),
                "build-test".to_string(),
            ],
            settings_override: None,
            extra_fixtures: vec!["frame.html".to_string()],
            register_extension_dir: true,
            engine: EngineSource::CopyFromExtension {
                dir: PathBuf::from("model/static/translation"),
            },
            glue: GluePatch::Splice {
                template: PathBuf::from("scripts/tests/BrowserGlue.jsm"),
                placeholder: "{version}".to_string(),
                anchor: "_monitorWebcompatReporterPref() {".to_string(),
                call_site_marker: "this._monitorWebcompatReporterPref();".to_string(),
                call_line: "      this._monitorTranslationsPrefAddon(); ".to_string(),
                renames: vec![
                    (
                        "_monitorTranslationsPref".to_string(),
                        "_monitorTranslationsPrefAddon".to_string(),
                    ),
                    ("lazy.AddonManager".to_string(), "AddonManager".to_string()),
                ],
            },
            test_prefs: vec!["fxtranslations.running.mochitest=true".to_string()],
            native_gemm: false,
            variants: vec![Variant::FallbackGemm],
        }
    }
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Profile for a browser channel
    pub fn profile(&self, channel: Channel) -> &ChannelProfile {
        match channel {
            Channel::Release => &self.release,
            Channel::Esr102 => &self.esr102,
        }
    }

    fn validate(&self) -> E2eResult<()> {
        for (channel, profile) in [(Channel::Release, &self.release), (Channel::Esr102, &self.esr102)] {
            if profile.build_command.is_empty() {
                return Err(E2eError::Config(format!(
                    "[{channel}] build_command must not be empty"
                )));
            }
            if profile.tree_dir.as_os_str().is_empty() || profile.tree_dir.is_absolute() {
                return Err(E2eError::Config(format!(
                    "[{channel}] tree_dir must be a relative, non-empty path"
                )));
            }
        }
        Ok(())
    }
}
