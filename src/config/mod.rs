//! Configuration module for notes-backup
//!
//! This module provides configuration management including:
//! - application and backup-root path resolution
//! - the key-value settings store
//! - the typed per-run settings snapshot

pub mod paths;
pub mod settings;
pub mod store;

pub use paths::{resolve_backup_root, AppPaths, ResolvedRoot};
pub use settings::{
    ArchiveMode, BackupLocation, BackupSettings, ExportFormat, PasswordState, ScheduleSettings,
};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};
