//! notes-backup - scheduled backups of a note database
//!
//! This library exports a user's notebooks and profile data, optionally
//! compresses and encrypts them with 7-Zip, places the result in a backup
//! directory and keeps only a configured number of backup sets.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: application paths, the settings store and typed settings
//! - `error`: custom error types
//! - `storage`: file helpers (atomic JSON, copy, cross-volume move)
//! - `export`: note exporter and notifier collaborators
//! - `backup`: staging, archiving, placement, retention and the pipeline
//! - `logging`: tracing setup and the per-run log file
//! - `cli`: command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use notes_backup::config::{AppPaths, JsonFileStore};
//!
//! let paths = AppPaths::new()?;
//! let store = JsonFileStore::new(paths.settings_file());
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod storage;

pub use error::BackupError;
