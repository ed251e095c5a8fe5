//! Error types and exit codes for codeclean-engine
//!
//! Only [`EngineError`] aborts a scan. Every other error type here is
//! captured, attributed to a file, detector or tool, and carried inside the
//! [`ScanResult`](crate::model::ScanResult).

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use thiserror::Error;

/// Fatal errors surfaced before any scheduling begins
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No readable roots among: {}", format_roots(.roots))]
    NoReadableRoots { roots: Vec<PathBuf> },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown detector in configuration: {name}")]
    UnknownDetector { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Exit code the driver reports for a fatal error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(2)
    }

    /// Configuration problems, as opposed to missing or unreadable input
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::UnknownDetector { .. })
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

fn format_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for fatal engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// A directory entry the walker could not read
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{}: {message}", .path.display())]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub message: String,
}

/// Failure signalled across the parser bridge boundary
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum BridgeError {
    #[error("bridge unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("bridge incompatible: expected protocol {expected}, found {found}")]
    Incompatible { expected: u32, found: String },

    #[error("bridge protocol violation: {message}")]
    Protocol { message: String },

    #[error("bridge call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("bridge IO error: {message}")]
    Io { message: String },
}

impl BridgeError {
    /// Start-up failures that degrade the language instead of failing files
    pub fn triggers_degradation(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Incompatible { .. })
    }
}

/// Why a file could not be turned into a structural tree
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("source is not valid UTF-8")]
    Encoding,

    #[error("no parser backend for language {lang}")]
    Unsupported { lang: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Payload of a `Failed` file outcome
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FileError {
    #[error("failed to read file: {message}")]
    Read { message: String },

    #[error("failed to parse file: {error}")]
    Parse { error: ParseError },

    /// The worker panicked or exited before reporting
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<ParseError> for FileError {
    fn from(error: ParseError) -> Self {
        Self::Parse { error }
    }
}

/// Failure of one external tool run
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    #[error("{tool} is not installed")]
    NotInstalled { tool: String },

    #[error("{tool} timed out after {millis}ms")]
    Timeout { tool: String, millis: u64 },

    #[error("{tool} exited with {exit_code:?} and produced no parseable output")]
    NoOutput {
        tool: String,
        exit_code: Option<i32>,
    },

    #[error("failed to run {tool}: {message}")]
    Spawn { tool: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradation_classes() {
        assert!(BridgeError::Unavailable {
            reason: "missing".into()
        }
        .triggers_degradation());
        assert!(BridgeError::Incompatible {
            expected: 1,
            found: "2".into()
        }
        .triggers_degradation());
        assert!(!BridgeError::Timeout { millis: 10 }.triggers_degradation());
    }

    #[test]
    fn test_config_errors_are_distinguished_from_roots() {
        let config = EngineError::invalid("bad band");
        let roots = EngineError::NoReadableRoots {
            roots: vec![PathBuf::from("/nope")],
        };
        assert!(config.is_config_error());
        assert!(!roots.is_config_error());
        assert!(roots.to_string().contains("/nope"));
    }
}
