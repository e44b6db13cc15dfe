//! Extension metadata: manifest version and engine registry

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static ROOT_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"engineRegistryRootURL\s*=\s*["']([^"']+)["']"#)
        .expect("Invalid engineRegistryRootURL regex")
});
static FILE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"fileName\s*:\s*["']([^"']+)["']"#).expect("Invalid fileName regex")
});
static SHA256_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"sha256\s*:\s*["']([0-9a-fA-F]{64})["']"#).expect("Invalid sha256 regex")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    version: Option<String>,
}

/// Read the `version` field of an extension manifest
pub fn read_manifest_version(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    let manifest: Manifest = serde_json::from_str(&content)?;
    manifest.version.ok_or_else(|| Error::MissingField {
        field: "version".to_string(),
        path: path.to_path_buf(),
    })
}

/// The translation engine entry of `engineRegistry.js`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRegistry {
    pub root_url: String,
    pub file_name: String,
    pub sha256: Option<String>,
}

impl EngineRegistry {
    /// Parse the first root URL, file name and checksum in the registry source.
    ///
    /// `engineRegistryRootURLTest` is not matched since the assignment
    /// requires `=` right after the identifier.
    pub fn parse(source: &str, path: &Path) -> Result<Self> {
        let capture = |re: &Regex| -> Option<String> {
            re.captures(source)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        };

        let root_url = capture(&ROOT_URL_REGEX).ok_or_else(|| Error::MissingField {
            field: "engineRegistryRootURL".to_string(),
            path: path.to_path_buf(),
        })?;
        let file_name = capture(&FILE_NAME_REGEX).ok_or_else(|| Error::MissingField {
            field: "fileName".to_string(),
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            root_url,
            file_name,
            sha256: capture(&SHA256_REGEX),
        })
    }

    /// Read and parse a registry file
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::parse(&source, path)
    }

    /// Download URL of the engine binary
    pub fn download_url(&self) -> String {
        format!("{}{}", self.root_url, self.file_name)
    }
}
