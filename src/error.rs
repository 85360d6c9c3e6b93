//! Custom error types for notes-backup
//!
//! This module defines the error hierarchy for the backup pipeline using
//! thiserror. Each variant corresponds to the stage of a run that failed, so
//! the pipeline can report and log it without inspecting messages.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Invalid configuration (backup root, template, password)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resolved backup root does not exist on disk
    #[error("The backup path '{}' does not exist", .0.display())]
    BackupPathMissing(PathBuf),

    /// Staging directory could not be created or cleared
    #[error("Staging error: {0}")]
    Staging(String),

    /// The external exporter failed
    #[error("Export error: {0}")]
    Export(String),

    /// The archive tool reported a failure or could not be started
    #[error("Archive error: {0}")]
    Archive(String),

    /// Moving the finished backup into place failed
    #[error("Placement error: {0}")]
    Placement(String),

    /// Deleting an old backup set failed
    #[error("Retention error: {0}")]
    Retention(String),

    /// Settings store could not be read or written
    #[error("Settings error: {0}")]
    Settings(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// A run was requested while another one is in flight
    #[error("Backup already running")]
    AlreadyRunning,
}

impl BackupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a staging error
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create an export error
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a placement error
    pub fn placement(msg: impl Into<String>) -> Self {
        Self::Placement(msg.into())
    }

    /// Create a retention error
    pub fn retention(msg: impl Into<String>) -> Self {
        Self::Retention(msg.into())
    }

    /// Check if this error was raised before any filesystem mutation
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::BackupPathMissing(_))
    }

    /// Check if this is the "backup root missing" condition
    pub fn is_path_missing(&self) -> bool {
        matches!(self, Self::BackupPathMissing(_))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
