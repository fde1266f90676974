//! Error types for the scene layer and the conversion pipeline

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors raised by a scene backend
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid prim path `{0}`")]
    InvalidPath(String),
    #[error("no prim at `{0}`")]
    NoSuchPrim(String),
    #[error("unsupported scene format: {0}")]
    FormatNotSupported(String),
    #[error("scene backend error: {0}")]
    Backend(String),
}

impl SceneError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SceneError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One failed attempt inside a strategy chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Errors returned by the conversion pipeline
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unsupported format `{0}`")]
    UnsupportedFormat(String),
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("{strategy} failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },
    #[error("all {} conversion methods for {format} failed", .failures.len())]
    AllStrategiesFailed {
        format: String,
        failures: Vec<StrategyFailure>,
    },
    #[error("external tool not available: {0}")]
    ExternalToolMissing(String),
    #[error("{tool} timed out after {seconds}s")]
    ExternalToolTimeout { tool: String, seconds: u64 },
    #[error("failed to write scene: {0}")]
    SceneWriteFailed(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl ConversionError {
    pub fn strategy(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        ConversionError::StrategyFailed {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}
