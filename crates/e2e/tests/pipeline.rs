//! Pipeline tests
//!
//! Runs the full per-variant pipeline against a synthetic extension
//! repository. External commands are answered by a scripted runner that
//! fabricates what npm, git and curl would have produced.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fxt_common::{Channel, MachStage, Variant};
use fxt_e2e::config::E2eConfig;
use fxt_e2e::process::{CommandOutput, CommandSpec, ProcessRunner};
use fxt_e2e::runner::ROOT_PRECONDITION;
use fxt_e2e::{E2eError, E2eResult, Pipeline, TestRunner};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use test_case::test_case;
use zip::write::SimpleFileOptions;

const VERSION: &str = "1.2.3";
const WASM: &[u8] = b"\0asm\x01\0\0\0fake engine";
const MACH_OUTPUT: &str = "TEST-UNEXPECTED-FAIL | browser_translation_test.js | timed out";

// Excerpts of the extension sources the variants mutate
const GEMM_WORKER_JS: &str = include_str!("fixtures/WASMTranslationWorker.js");
const TRANSLATION_WORKER_JS: &str = include_str!("fixtures/translationWorker.js");
const BACKGROUND_JS: &str = include_str!("fixtures/backgroundScript.js");

const GEMM_WORKER: &str = "controller/translation/WASMTranslationWorker.js";
const TRANSLATION_WORKER: &str = "controller/translation/translationWorker.js";
const BACKGROUND: &str = "controller/backgroundScript.js";

const TREE_GLUE: &str = "\
BrowserGlue.prototype = {
  _init() {
    this._monitorWebcompatReporterPref();
  },

  _monitorWebcompatReporterPref() {
    const addons = [
      \"1.0.0\",
      \"resource://builtin-addons/translations/\",
    ];
  },
};
";

const GLUE_TEMPLATE: &str = "\
  _monitorTranslationsPref() {
    const version = {version};
    lazy.AddonManager.maybeInstallBuiltinAddon(\"translations@mozilla.org\", version);
  },
";

/// Answers commands the way the real tools would leave the filesystem
#[derive(Default)]
struct ScriptedRunner {
    log: Vec<CommandSpec>,
    fail_mach: Option<&'static str>,
    skip_artifact: bool,
    tree_glue: Option<&'static str>,
}

impl ScriptedRunner {
    fn commands(&self) -> Vec<String> {
        self.log
            .iter()
            .map(|spec| {
                let mut parts = vec![spec.program_name().to_string()];
                parts.extend(spec.args.iter().cloned());
                parts.join(" ")
            })
            .collect()
    }

    fn count(&self, program: &str) -> usize {
        self.log.iter().filter(|s| s.program_name() == program).count()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&mut self, spec: &CommandSpec) -> E2eResult<CommandOutput> {
        self.log.push(spec.clone());
        let ok = CommandOutput {
            code: Some(0),
            output: String::new(),
        };

        match (spec.program_name(), spec.args.first().map(String::as_str)) {
            ("npm", _) => {
                if !self.skip_artifact {
                    write_xpi(&spec.cwd.join("web-ext-artifacts/firefox_translations.xpi"));
                }
            }
            ("git", Some("clone")) => {
                write_tree(&spec.cwd.join(&spec.args[2]), self.tree_glue.unwrap_or(TREE_GLUE));
            }
            ("curl", _) => {
                let dest = &spec.args[3];
                fs::write(dest, WASM).unwrap();
            }
            ("mach", Some(stage)) if self.fail_mach == Some(stage) => {
                return Ok(CommandOutput {
                    code: Some(1),
                    output: MACH_OUTPUT.to_string(),
                });
            }
            _ => {}
        }
        Ok(ok)
    }
}

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn write_xpi(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    let entries: [(&str, &[u8]); 5] = [
        ("manifest.json", br#"{"version": "1.2.3"}"#),
        (GEMM_WORKER, GEMM_WORKER_JS.as_bytes()),
        (TRANSLATION_WORKER, TRANSLATION_WORKER_JS.as_bytes()),
        (BACKGROUND, BACKGROUND_JS.as_bytes()),
        ("model/static/translation/bergamot-translator-worker.wasm", WASM),
    ];
    for (name, data) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn write_tree(tree: &Path, glue: &str) {
    write_file(&tree.join("browser/components/BrowserGlue.jsm"), glue.as_bytes());
    write_file(
        &tree.join("browser/extensions/moz.build"),
        b"DIRS += [\n    \"webcompat\",\n]\n",
    );
    write_file(
        &tree.join("browser/extensions/translations/moz.build"),
        b"FINAL_TARGET_FILES += []\n",
    );
}

/// Create an extension repository checkout
fn create_repo(dir: &Path, registry_sha: Option<&str>) -> PathBuf {
    let root = dir.join("firefox-translations");
    let tests = root.join("scripts/tests");

    for name in [
        "browser.ini",
        "browser_translation_test.html",
        "browser_translation_test.js",
        "frame.html",
    ] {
        write_file(&tests.join(name), format!("// {name}\n").as_bytes());
    }
    write_file(&tests.join("BrowserGlue.jsm"), GLUE_TEMPLATE.as_bytes());
    write_file(&tests.join("esen/lex.50.50.esen.s2t.bin"), b"esen");
    write_file(&tests.join("enes/model.enes.intgemm.alphas.bin"), b"enes");

    write_file(
        &root.join("extension/manifest.json"),
        format!(r#"{{"name": "firefox-translations", "version": "{VERSION}"}}"#).as_bytes(),
    );
    write_file(&root.join("extension/settings.js"), b"export const TEST = false;\n");
    write_file(&root.join("extension/settings/test.js"), b"export const TEST = true;\n");

    let sha = registry_sha
        .map(str::to_string)
        .unwrap_or_else(|| hex::encode(Sha256::digest(WASM)));
    let registry = format!(
        "const engineRegistryRootURL = \"https://example.org/engine/\";\n\
         const engineRegistryRootURLTest = \"https://example.org/test/\";\n\
         const engineRegistry = {{\n  bergamotTranslatorWasm: {{\n    \
         fileName: \"bergamot-translator-worker.wasm\",\n    sha256: \"{sha}\",\n  }},\n}};\n"
    );
    write_file(&root.join("extension/model/engineRegistry.js"), registry.as_bytes());
    root
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_release_pipeline_commands() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner::default();

    let mut runner =
        TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted);
    let suite = runner.run_variants(&[Variant::FasterGemm]).unwrap();
    assert!(suite.success());
    assert_eq!(suite.passed, 1);

    let test_path = "browser/extensions/translations/test/browser/browser_translation_test.js";
    assert_eq!(
        scripted.commands(),
        vec![
            "npm run build".to_string(),
            "git clone hg::https://hg.mozilla.org/mozilla-central gecko".to_string(),
            format!(
                "curl -L --fail -o {} https://example.org/engine/bergamot-translator-worker.wasm",
                root.join("gecko/browser/extensions/translations/test/browser/bergamot-translator-worker.wasm")
                    .display()
            ),
            "mach build".to_string(),
            format!("mach test {test_path}"),
        ]
    );

    // mach runs from inside the tree
    let mach = scripted.log.last().unwrap();
    assert_eq!(mach.cwd, root.join("gecko"));
    assert_eq!(PathBuf::from(&mach.program), root.join("gecko/mach"));
}

#[test]
fn test_release_tree_contents() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner::default();

    TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted)
        .run_variants(&[Variant::FasterGemm])
        .unwrap();

    assert_eq!(read(root.join("extension/settings.js")), "export const TEST = true;\n");

    let translations = root.join("gecko/browser/extensions/translations");
    assert!(translations.join("extension/manifest.json").is_file());

    let test_dir = translations.join("test/browser");
    for name in ["browser.ini", "browser_translation_test.html", "browser_translation_test.js"] {
        assert!(test_dir.join(name).is_file(), "missing {name}");
    }
    assert!(!test_dir.join("frame.html").exists());
    assert_eq!(read(test_dir.join("esen/lex.50.50.esen.s2t.bin")), "esen");
    assert_eq!(read(test_dir.join("enes/model.enes.intgemm.alphas.bin")), "enes");
    assert_eq!(
        fs::read(test_dir.join("bergamot-translator-worker.wasm")).unwrap(),
        WASM
    );

    let glue = read(root.join("gecko/browser/components/BrowserGlue.jsm"));
    assert!(glue.contains("            \"1.2.3\",\n      \"resource://builtin-addons/translations/\""));
    assert!(!glue.contains("\"1.0.0\""));

    assert_eq!(
        read(root.join("gecko/mozconfig")),
        "ac_add_options --enable-artifact-builds\n"
    );
    assert!(read(translations.join("moz.build"))
        .ends_with("BROWSER_CHROME_MANIFESTS += [\"test/browser/browser.ini\"]\n"));
    assert_eq!(
        read(root.join("gecko/browser/extensions/moz.build")),
        "DIRS += [\n    \"webcompat\",\n]\n"
    );

    let extension = translations.join("extension");
    assert_eq!(read(extension.join(GEMM_WORKER)), GEMM_WORKER_JS);
    assert_eq!(read(extension.join(BACKGROUND)), BACKGROUND_JS);
}

#[test]
fn test_esr102_pipeline() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner::default();

    let mut runner =
        TestRunner::with_runner(E2eConfig::default(), Channel::Esr102, &root, &mut scripted);
    let suite = runner.run_all().unwrap();
    assert_eq!(suite.total, 1);
    assert_eq!(suite.results[0].variant, Variant::FallbackGemm);

    assert_eq!(
        scripted.commands(),
        vec![
            "npm run build-test",
            "git clone hg::https://hg.mozilla.org/mozilla-unified mozilla-esr102",
            "git checkout bookmarks/esr102",
            "mach build",
            "mach test --setpref=fxtranslations.running.mochitest=true \
             browser/extensions/translations/test/browser/browser_translation_test.js",
        ]
    );
    assert_eq!(scripted.log[2].cwd, root.join("mozilla-esr102"));

    // settings are only swapped for the release channel
    assert_eq!(read(root.join("extension/settings.js")), "export const TEST = false;\n");

    let tree = root.join("mozilla-esr102");
    let test_dir = tree.join("browser/extensions/translations/test/browser");
    assert!(test_dir.join("frame.html").is_file());
    assert_eq!(
        fs::read(test_dir.join("translation/bergamot-translator-worker.wasm")).unwrap(),
        WASM
    );

    assert!(read(tree.join("browser/extensions/moz.build"))
        .ends_with("]\nDIRS += [ \n    \"translations\", \n] \n"));

    let glue = read(tree.join("browser/components/BrowserGlue.jsm"));
    assert!(glue.contains(
        "    this._monitorWebcompatReporterPref();\n      this._monitorTranslationsPrefAddon(); \n"
    ));
    assert!(glue.contains("  _monitorTranslationsPrefAddon() {\n"));
    assert!(glue.contains("const version = \"1.2.3\";"));
    assert!(glue.contains("    AddonManager.maybeInstallBuiltinAddon"));
    assert!(!glue.contains("lazy.AddonManager"));
    assert!(glue.contains("  },\n\n  _monitorWebcompatReporterPref() {\n"));

    // ESR 102 has no native gemm, so the fallback runs on unmodified sources
    let extension = tree.join("browser/extensions/translations/extension");
    assert_eq!(read(extension.join(GEMM_WORKER)), GEMM_WORKER_JS);
    assert_eq!(read(extension.join(TRANSLATION_WORKER)), TRANSLATION_WORKER_JS);
}

#[test_case(Variant::FasterGemm, 0, false ; "faster gemm leaves sources alone")]
#[test_case(Variant::FallbackGemm, 3, false ; "fallback gemm disables the native gemm")]
#[test_case(Variant::NonWormhole, 0, true ; "non wormhole forces arm")]
fn test_variant_mutation(variant: Variant, disabled: usize, arm: bool) {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner::default();

    TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted)
        .run_variants(&[variant])
        .unwrap();

    let extension = root.join("gecko/browser/extensions/translations/extension");
    let worker = read(extension.join(GEMM_WORKER));
    assert_eq!(worker.matches("DISABLED_mozIntGemm").count(), disabled);
    assert_eq!(read(extension.join(TRANSLATION_WORKER)), TRANSLATION_WORKER_JS);

    let background = read(extension.join(BACKGROUND));
    assert_eq!(
        background.contains(
            "    platformInfo = await browser.runtime.getPlatformInfo();\n    \
             platformInfo.arch = \"arm\";\n    \
             cachedEnvInfo = await browser.experiments"
        ),
        arm
    );
}

#[test]
fn test_release_runs_every_variant_from_scratch() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    write_file(&root.join("gecko/stale.txt"), b"left over");
    let mut scripted = ScriptedRunner::default();

    let mut runner =
        TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted);
    let suite = runner.run_all().unwrap();
    let path = runner.write_results(&suite).unwrap();

    assert_eq!(suite.total, 3);
    assert_eq!(suite.passed, 3);
    assert_eq!(
        suite.results.iter().map(|r| r.variant).collect::<Vec<_>>(),
        Variant::ALL.to_vec()
    );
    assert!(!root.join("gecko/stale.txt").exists());
    assert_eq!(scripted.count("npm"), 3);
    assert_eq!(scripted.count("git"), 3);
    assert_eq!(scripted.count("mach"), 6);

    // the last variant ran against a fresh worker, not a twice-disabled one
    let worker = read(
        root.join("gecko/browser/extensions/translations/extension").join(GEMM_WORKER),
    );
    assert!(!worker.contains("DISABLED_"));

    assert_eq!(path, root.join("test-results/test-results.json"));
    let json: serde_json::Value = serde_json::from_str(&read(path)).unwrap();
    assert_eq!(json["channel"], "release");
    assert_eq!(json["results"][1]["variant"], "fallback-gemm");
}

#[test_case("test", MachStage::Test ; "test stage")]
#[test_case("build", MachStage::Build ; "build stage")]
fn test_mach_failure_stops_the_run(fail: &'static str, stage: MachStage) {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner {
        fail_mach: Some(fail),
        ..Default::default()
    };

    let mut runner =
        TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted);
    let err = runner.run_all().unwrap_err();

    match &err {
        E2eError::MachFailed {
            variant,
            stage: failed,
            code,
            output,
        } => {
            assert_eq!(*variant, Variant::FasterGemm);
            assert_eq!(*failed, stage);
            assert_eq!(*code, Some(1));
            assert_eq!(output, MACH_OUTPUT);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.to_string(), "Tests with faster gemm failed");
    assert_eq!(err.captured_output(), Some(MACH_OUTPUT));

    let results = runner.results();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].failed_stage, Some(stage));
    assert_eq!(scripted.count("npm"), 1);
}

#[test]
fn test_esr102_failure_message() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner {
        fail_mach: Some("test"),
        ..Default::default()
    };

    let err = TestRunner::with_runner(E2eConfig::default(), Channel::Esr102, &root, &mut scripted)
        .run_all()
        .unwrap_err();
    assert_eq!(err.to_string(), "Tests with fallback gemm failed");
}

#[test]
fn test_outside_repository_root() {
    let dir = TempDir::new().unwrap();
    let mut scripted = ScriptedRunner::default();

    let err = TestRunner::with_runner(E2eConfig::default(), Channel::Release, dir.path(), &mut scripted)
        .run_all()
        .unwrap_err();

    assert!(matches!(err, E2eError::Precondition(_)));
    assert_eq!(err.to_string(), ROOT_PRECONDITION);
    assert!(scripted.log.is_empty());
}

#[test]
fn test_missing_artifact() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner {
        skip_artifact: true,
        ..Default::default()
    };

    let err = TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted)
        .run_all()
        .unwrap_err();

    assert!(matches!(err, E2eError::Precondition(ref msg) if msg.contains("firefox_translations.xpi")));
    assert_eq!(scripted.count("git"), 0);
}

#[test]
fn test_engine_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), Some(&"0".repeat(64)));
    let mut scripted = ScriptedRunner::default();

    let err = TestRunner::with_runner(E2eConfig::default(), Channel::Release, &root, &mut scripted)
        .run_all()
        .unwrap_err();

    assert!(matches!(
        err,
        E2eError::Common(fxt_common::Error::ChecksumMismatch { .. })
    ));
    assert_eq!(scripted.count("mach"), 0);
}

#[test_case(Channel::Release ; "release version marker")]
#[test_case(Channel::Esr102 ; "esr102 splice anchor")]
fn test_missing_glue_anchor(channel: Channel) {
    let dir = TempDir::new().unwrap();
    let root = create_repo(dir.path(), None);
    let mut scripted = ScriptedRunner {
        tree_glue: Some("BrowserGlue.prototype = {};\n"),
        ..Default::default()
    };

    let mut runner = TestRunner::with_runner(E2eConfig::default(), channel, &root, &mut scripted);
    let err = runner.run_all().unwrap_err();

    assert!(matches!(
        err,
        E2eError::Common(fxt_common::Error::AnchorNotFound { .. })
    ));
    assert_eq!(
        read(root.join(runner.config().profile(channel).tree_dir.join("browser/components/BrowserGlue.jsm"))),
        "BrowserGlue.prototype = {};\n"
    );
    assert_eq!(scripted.count("mach"), 0);
}

/// Unpack the extension sources into a tree without running any command
fn unpacked_tree(root: &Path, tree_dir: &str) -> PathBuf {
    let extension = root.join(tree_dir).join("browser/extensions/translations/extension");
    write_file(&extension.join(GEMM_WORKER), GEMM_WORKER_JS.as_bytes());
    write_file(&extension.join(TRANSLATION_WORKER), TRANSLATION_WORKER_JS.as_bytes());
    write_file(&extension.join(BACKGROUND), BACKGROUND_JS.as_bytes());
    extension
}

#[test]
fn test_fallback_gemm_on_extension_worker() {
    let dir = TempDir::new().unwrap();
    let extension = unpacked_tree(dir.path(), "gecko");
    let config = E2eConfig::default();
    let mut scripted = ScriptedRunner::default();

    Pipeline::new(&config, Channel::Release, dir.path(), &mut scripted)
        .apply_variant(Variant::FallbackGemm)
        .unwrap();

    let worker = read(extension.join(GEMM_WORKER));
    assert!(worker.contains("    static NATIVE_INT_GEMM = 'DISABLED_mozIntGemm';\n"));
    assert!(worker.contains("        if (!WebAssembly['DISABLED_mozIntGemm']) {\n"));
    assert!(worker.contains("new WebAssembly.Instance(WebAssembly['DISABLED_mozIntGemm']()"));
    assert!(!worker.replace("DISABLED_mozIntGemm", "").contains("mozIntGemm"));
    assert!(scripted.log.is_empty());
}

#[test]
fn test_non_wormhole_on_extension_background_script() {
    let dir = TempDir::new().unwrap();
    let extension = unpacked_tree(dir.path(), "gecko");
    let config = E2eConfig::default();
    let mut scripted = ScriptedRunner::default();

    Pipeline::new(&config, Channel::Release, dir.path(), &mut scripted)
        .apply_variant(Variant::NonWormhole)
        .unwrap();

    let background = read(extension.join(BACKGROUND));
    let expected = BACKGROUND_JS.replace(
        "    platformInfo = await browser.runtime.getPlatformInfo();\n",
        "    platformInfo = await browser.runtime.getPlatformInfo();\n    platformInfo.arch = \"arm\";\n",
    );
    assert_ne!(expected, BACKGROUND_JS);
    assert_eq!(background, expected);
    assert_eq!(read(extension.join(GEMM_WORKER)), GEMM_WORKER_JS);
}

#[test]
fn test_esr102_fallback_gemm_leaves_worker_alone() {
    let dir = TempDir::new().unwrap();
    let extension = unpacked_tree(dir.path(), "mozilla-esr102");
    let config = E2eConfig::default();
    let mut scripted = ScriptedRunner::default();

    Pipeline::new(&config, Channel::Esr102, dir.path(), &mut scripted)
        .apply_variant(Variant::FallbackGemm)
        .unwrap();

    assert_eq!(read(extension.join(GEMM_WORKER)), GEMM_WORKER_JS);
}
