//! fxt-common
//!
//! Shared primitives for the Firefox Translations end-to-end harness:
//! anchored text patching, artifact extraction and extension metadata.

pub mod artifact;
pub mod error;
pub mod extension;
pub mod splice;
pub mod types;

// Re-export commonly used types
pub use artifact::{compute_file_sha256, copy_dir_all, extract_zip, ExtractionReport};
pub use error::{Error, Result};
pub use extension::{read_manifest_version, EngineRegistry};
pub use splice::{disabled_token, CallSite};
pub use types::*;

/// fxt version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
