// src/error.rs

//! Fatal error types. Discrepancies between the histories are not errors;
//! they are collected into [`crate::model::MappingResult`].

use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::ConfigError;

/// Raw log text could not be turned into change records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("malformed log: {0}")]
    Malformed(String),

    #[error("log entry {id}: {message}")]
    InvalidEntry { id: String, message: String },

    #[error("log output is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that abort an audit run.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// A strict query exited with a non-zero status.
    #[error("`{}` exited with status {status}: {stderr}", command.join(" "))]
    ExternalTool {
        command: Vec<String>,
        args: BTreeMap<String, String>,
        status: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, AuditError>;
