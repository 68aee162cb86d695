//! STP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::PathBuf;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, StpError>;

/// Top-level error type for the subtree pruner.
#[derive(Debug, Error)]
pub enum StpError {
    #[error("[STP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[STP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[STP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[STP-1101] root path missing or not a directory: {path}")]
    RootMissing { path: PathBuf },

    #[error("[STP-2001] metadata probe failure for {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STP-2002] directory listing failure for {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STP-2003] removal failure for {path}: {source}")]
    Removal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STP-2004] directory unexpectedly non-empty at removal time: {path}")]
    RaceNotEmpty { path: PathBuf },

    #[error("[STP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[STP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StpError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "STP-1001",
            Self::MissingConfig { .. } => "STP-1002",
            Self::ConfigParse { .. } => "STP-1003",
            Self::RootMissing { .. } => "STP-1101",
            Self::Probe { .. } => "STP-2001",
            Self::List { .. } => "STP-2002",
            Self::Removal { .. } => "STP-2003",
            Self::RaceNotEmpty { .. } => "STP-2004",
            Self::Serialization { .. } => "STP-2101",
            Self::Io { .. } => "STP-3002",
        }
    }

    /// Whether a later run might succeed where this one failed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Probe { .. }
                | Self::List { .. }
                | Self::Removal { .. }
                | Self::RaceNotEmpty { .. }
                | Self::Io { .. }
        )
    }
}

impl From<serde_json::Error> for StpError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for StpError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
