//! Error types for the publishing pipeline.
//!
//! Every failure carries the stage it happened in plus whatever the external
//! collaborator reported (exit code, stderr, HTTP status), so a failed run can
//! be diagnosed without re-running it.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for all pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Required configuration (usually store credentials) is absent
    #[error("Configuration missing: {what}")]
    ConfigurationMissing {
        /// What was expected
        what: String,
    },

    /// Target container or artifact file does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// What could not be located
        what: String,
    },

    /// Archive could not be opened or lacks the requested member
    #[error("Extraction failed for {}: {reason}", .archive.display())]
    Extraction {
        /// Archive being read
        archive: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Format conversion or a field query failed
    #[error("Metadata error ({step}): {detail}")]
    Metadata {
        /// Conversion step or queried field
        step: String,
        /// Exit code reported by the tool, when there was one
        exit_code: Option<i32>,
        /// Captured stderr or validation message
        detail: String,
    },

    /// Ledger file exists but does not hold a flat string→integer mapping
    #[error("Build ledger {} is corrupt at key {key:?}: {reason}", .path.display())]
    LedgerCorrupt {
        /// Ledger file
        path: PathBuf,
        /// Offending key (empty when the document itself is malformed)
        key: String,
        /// Reason for the error
        reason: String,
    },

    /// External tool exited nonzero
    #[error("{stage} failed: `{command}` exited with {}: {stderr}", .exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Command {
        /// Pipeline stage the command belonged to
        stage: String,
        /// Rendered command line
        command: String,
        /// Exit code, `None` when terminated by a signal
        exit_code: Option<i32>,
        /// Captured stderr
        stderr: String,
    },

    /// External tool could not be started at all
    #[error("Failed to run `{command}`: {error}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying IO error
        #[source]
        error: std::io::Error,
    },

    /// Object store errors
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Template registration or rendering errors
    #[error("Template error ({template}): {reason}")]
    Template {
        /// Template name
        template: String,
        /// Reason for the error
        reason: String,
    },

    /// Commit status API errors
    #[error("Status API error: {0}")]
    StatusApi(String),

    /// IO errors with file context
    #[error("{context} ({}): {error}", .path.display())]
    Fs {
        /// What was being attempted
        context: String,
        /// File involved
        path: PathBuf,
        /// Underlying IO error
        #[source]
        error: std::io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("Configuration error in {}: {error}", .path.display())]
    Config {
        /// Configuration file
        path: PathBuf,
        /// Parse error
        #[source]
        error: toml::de::Error,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl PipelineError {
    /// Short stage label used in the final failure summary.
    pub fn stage(&self) -> &str {
        match self {
            Self::ConfigurationMissing { .. } | Self::Config { .. } => "configuration",
            Self::NotFound { .. } => "preflight",
            Self::Extraction { .. } => "extract",
            Self::Metadata { .. } => "metadata",
            Self::LedgerCorrupt { .. } | Self::Json(_) => "ledger",
            Self::Command { stage, .. } => stage.as_str(),
            Self::Spawn { .. } => "command",
            Self::Store(_) => "store",
            Self::Template { .. } => "template",
            Self::StatusApi(_) => "notify",
            Self::Fs { .. } => "pipeline",
        }
    }
}

/// Attach file context to IO results.
pub trait ErrorExt<T> {
    /// Wrap an IO error with what was being done and to which path.
    fn fs_context(self, context: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| PipelineError::Fs {
            context: context.to_string(),
            path: path.into(),
            error,
        })
    }
}
