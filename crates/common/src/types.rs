//! Core types for fxt

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Browser source line a run is executed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// mozilla-central
    Release,
    /// mozilla-unified at `bookmarks/esr102`
    Esr102,
}

impl Default for Channel {
    fn default() -> Self {
        Self::Release
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Release => write!(f, "release"),
            Channel::Esr102 => write!(f, "esr102"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" | "central" | "nightly" => Ok(Channel::Release),
            "esr102" => Ok(Channel::Esr102),
            other => Err(format!("unknown channel '{other}' (expected release or esr102)")),
        }
    }
}

/// Engine/platform combination exercised by one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Native `mozIntGemm` is left available
    FasterGemm,
    /// Native gemm token is disabled so the wasm fallback is linked
    FallbackGemm,
    /// Reported architecture is forced to arm, which selects the
    /// non-wormhole engine build
    NonWormhole,
}

impl Variant {
    pub const ALL: [Variant; 3] = [
        Variant::FasterGemm,
        Variant::FallbackGemm,
        Variant::NonWormhole,
    ];

    /// Human-readable label used in progress and failure messages
    pub fn label(&self) -> &'static str {
        match self {
            Variant::FasterGemm => "faster gemm",
            Variant::FallbackGemm => "fallback gemm",
            Variant::NonWormhole => "non-wormhole",
        }
    }

    pub fn disables_native_gemm(&self) -> bool {
        matches!(self, Variant::FallbackGemm)
    }

    pub fn forces_arm(&self) -> bool {
        matches!(self, Variant::NonWormhole)
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::FasterGemm => write!(f, "faster-gemm"),
            Variant::FallbackGemm => write!(f, "fallback-gemm"),
            Variant::NonWormhole => write!(f, "non-wormhole"),
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| {
                format!("unknown variant '{s}' (expected faster-gemm, fallback-gemm or non-wormhole)")
            })
    }
}

/// Step of the browser's own toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachStage {
    Build,
    Test,
}

impl std::fmt::Display for MachStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachStage::Build => write!(f, "build"),
            MachStage::Test => write!(f, "test"),
        }
    }
}
