//! Firefox Translations E2E Harness
//!
//! This crate drives the extension's browser-chrome test inside a real
//! Firefox source tree:
//! - Builds the packaged extension and unpacks it into a fresh checkout
//! - Copies test fixtures and provisions the translation engine
//! - Patches `BrowserGlue.jsm` and the build files to load the extension
//! - Forces one gemm variant, then runs `mach build` and `mach test`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── check_root()                                         │
//! │    ├── run_variants(&[Variant]) -> TestSuiteResult          │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (one per variant)                                 │
//! │    ├── reset_environment   rm <tree>                        │
//! │    ├── build_artifact      npm run build[-test]             │
//! │    ├── acquire_source      git clone / git checkout         │
//! │    ├── inject_artifact     unzip xpi, copy fixtures         │
//! │    ├── provision_engine    curl wasm | copy engine dir      │
//! │    ├── patch_sources       BrowserGlue.jsm, moz.build       │
//! │    ├── configure_build     mozconfig, chrome manifest       │
//! │    ├── apply_variant       faster / fallback / non-wormhole │
//! │    └── build_and_test      mach build, mach test            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProcessRunner                                              │
//! │    └── SystemRunner -> ChildGuard (SIGTERM on drop)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod tree;

pub use config::E2eConfig;
pub use error::{E2eError, E2eResult};
pub use pipeline::Pipeline;
pub use process::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use runner::{TestRunner, TestSuiteResult, VariantResult};
