// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum TopologyError {
    /// No repository at the path, or `git` could not produce a history
    #[error("history reader: history unavailable for {path}: {reason}")]
    HistoryUnavailable { path: PathBuf, reason: String },

    /// The assembled artifact broke the output contract; nothing was written
    #[error("topology assembler: schema validation failed ({} violation(s)): {}", violations.len(), violations.join("; "))]
    SchemaValidationFailed { violations: Vec<String> },

    #[error("configuration: {0}")]
    Config(String),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl TopologyError {
    pub fn history(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TopologyError::HistoryUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Pipeline stage that failed, for operator-facing reports.
    pub fn stage(&self) -> &'static str {
        match self {
            TopologyError::HistoryUnavailable { .. } => "history",
            TopologyError::SchemaValidationFailed { .. } => "validation",
            TopologyError::Config(_) => "config",
            TopologyError::Io { .. } | TopologyError::Json(_) => "output",
        }
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// Per-file failures. Always recovered into a stub record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("cannot read {path}: {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("no structural parser for {language} ({path})")]
    UnparseableLanguage { path: String, language: String },

    #[error("unbalanced delimiters in {path} near line {line}")]
    Unbalanced { path: String, line: usize },
}
