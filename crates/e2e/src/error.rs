//! Error types for E2E runs

use fxt_common::{MachStage, Variant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("{0}")]
    Precondition(String),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with {}", exit_label(*code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Tests with {} failed", variant.label())]
    MachFailed {
        variant: Variant,
        stage: MachStage,
        code: Option<i32>,
        output: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] fxt_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl E2eError {
    /// Output captured from the failing subprocess, if any
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            E2eError::CommandFailed { output, .. } | E2eError::MachFailed { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
