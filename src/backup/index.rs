//! Backup index
//!
//! The list of known backup sets, persisted as one value (`backupInfo`) in
//! the settings store. Pruning order is decided from the recorded dates, not
//! from filesystem timestamps.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backup::naming::valid_file_name;
use crate::config::settings::keys;
use crate::config::store::SettingsStore;
use crate::error::{BackupError, BackupResult};

/// One retained backup set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSetEntry {
    /// File or directory name directly under the backup root
    pub name: String,
    /// Run start time, epoch milliseconds
    pub date: i64,
}

impl BackupSetEntry {
    pub fn new(name: impl Into<String>, date: i64) -> Self {
        Self {
            name: name.into(),
            date,
        }
    }

    /// Whether `name` is a single file name, so it can only refer to
    /// something directly inside the backup root
    pub fn has_plain_name(&self) -> bool {
        let mut components = Path::new(&self.name).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) && valid_file_name(&self.name)
    }

    /// Whether the backup set still exists under `base`
    ///
    /// Always false for names that are not plain file names.
    pub fn exists_in(&self, base: &Path) -> bool {
        self.has_plain_name() && base.join(&self.name).symlink_metadata().is_ok()
    }
}

/// Load/save access to the persisted index
pub struct BackupIndexStore<'a> {
    store: &'a dyn SettingsStore,
}

impl<'a> BackupIndexStore<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self { store }
    }

    /// Read the index; a missing value is an empty index
    ///
    /// Older hosts stored the index as a JSON string, which is accepted too.
    pub fn load(&self) -> BackupResult<Vec<BackupSetEntry>> {
        let value = match self.store.value(keys::BACKUP_INFO)? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
            Some(Value::String(s)) => serde_json::from_str(&s).map_err(|e| {
                BackupError::Settings(format!("Failed to parse backup index: {}", e))
            })?,
            Some(other) => other,
        };

        serde_json::from_value(value)
            .map_err(|e| BackupError::Settings(format!("Failed to parse backup index: {}", e)))
    }

    /// Replace the persisted index
    pub fn save(&self, entries: &[BackupSetEntry]) -> BackupResult<()> {
        self.store
            .set_value(keys::BACKUP_INFO, serde_json::to_value(entries)?)
    }

    /// Append one entry and persist
    pub fn append(&self, entry: BackupSetEntry) -> BackupResult<()> {
        let mut entries = self.load()?;
        entries.push(entry);
        self.save(&entries)
    }
}
