// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for silentprint.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ErrorKind;

/// Top-level error type for all silentprint operations.
#[derive(Debug, Error)]
pub enum PrintError {
    // -- Intake errors --
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    InvalidArgumentType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    // -- Source resolution --
    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("copy of {path} into the cache failed: {source}")]
    LocalCopyFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // -- Printer resolution --
    #[error("printer `{0}` is not installed")]
    UnknownPrinter(String),

    #[error("printer enumeration failed: {0}")]
    Enumeration(String),

    // -- Admission --
    #[error("printing is paused or disabled")]
    PrintingSuspended,

    // -- Execution --
    #[error("print converter not found at {}", path.display())]
    MissingExecutable { path: PathBuf },

    #[error("print converter timed out after {secs}s")]
    ExecutionTimeout { secs: u64 },

    #[error("print converter could not be started: {0}")]
    LaunchFailed(#[source] std::io::Error),

    #[error("converter rejected the document: {stderr}")]
    CorruptInput { stderr: String },

    #[error("converter failed without diagnostics (no default printer?)")]
    NoDefaultPrinter,

    #[error("converter failed: {stderr}")]
    ExecutionFailed { stderr: String },

    // -- Everything else --
    #[error("internal error: {0}")]
    Internal(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrintError {
    /// Map onto the caller-visible taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::InvalidArgumentType { .. } | Self::MalformedMessage(_) => {
                ErrorKind::InvalidArgumentType
            }
            Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::LocalCopyFailed { .. } => ErrorKind::LocalCopyFailed,
            Self::UnknownPrinter(_) => ErrorKind::UnknownPrinter,
            Self::PrintingSuspended => ErrorKind::PrintingSuspended,
            Self::MissingExecutable { .. } => ErrorKind::MissingExecutable,
            Self::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            Self::LaunchFailed(_) => ErrorKind::LaunchFailed,
            Self::CorruptInput { .. } => ErrorKind::CorruptInput,
            Self::NoDefaultPrinter => ErrorKind::NoDefaultPrinter,
            Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            Self::Enumeration(_)
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::InternalError,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintError>;
