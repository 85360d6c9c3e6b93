//! Key-value settings store
//!
//! The pipeline reads configuration and persists the backup index through the
//! [`SettingsStore`] trait. Values are JSON so the same store can hold plain
//! settings and serialized structures alike.
//!
//! Two implementations are provided: [`JsonFileStore`], which keeps
//! everything in a single `settings.json`, and [`MemoryStore`] for embedding
//! hosts and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_json, write_json_atomic};

/// Key-value access to host settings
pub trait SettingsStore: Send + Sync {
    /// Read a plugin-level setting
    fn value(&self, key: &str) -> BackupResult<Option<Value>>;

    /// Read a host-level (global) setting such as the profile directory
    fn global_value(&self, key: &str) -> BackupResult<Option<Value>>;

    /// Persist a plugin-level setting
    fn set_value(&self, key: &str, value: Value) -> BackupResult<()>;
}

/// On-disk layout of the settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
}

/// Settings store backed by a JSON file
///
/// Every read goes to disk so edits made while a daemon is running are
/// picked up by the next run.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (without creating) the store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file
    pub fn load(&self) -> BackupResult<SettingsFile> {
        read_json(&self.path)
    }

    /// Replace the whole file
    pub fn save(&self, file: &SettingsFile) -> BackupResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_json_atomic(&self.path, file)
    }

    /// Set a global value (host configuration, not touched by the pipeline)
    pub fn set_global(&self, key: &str, value: Value) -> BackupResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        file.globals.insert(key.to_string(), value);
        write_json_atomic(&self.path, &file)
    }
}

impl SettingsStore for JsonFileStore {
    fn value(&self, key: &str) -> BackupResult<Option<Value>> {
        Ok(self.load()?.values.get(key).cloned())
    }

    fn global_value(&self, key: &str) -> BackupResult<Option<Value>> {
        Ok(self.load()?.globals.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: Value) -> BackupResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        file.values.insert(key.to_string(), value);
        write_json_atomic(&self.path, &file)
    }
}

/// In-memory settings store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<SettingsFile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for plugin values
    pub fn with_value(self, key: &str, value: impl Into<Value>) -> Self {
        self.lock().values.insert(key.to_string(), value.into());
        self
    }

    /// Builder-style setter for global values
    pub fn with_global(self, key: &str, value: impl Into<Value>) -> Self {
        self.lock().globals.insert(key.to_string(), value.into());
        self
    }

    /// Snapshot of everything currently stored
    pub fn snapshot(&self) -> SettingsFile {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SettingsFile> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemoryStore {
    fn value(&self, key: &str) -> BackupResult<Option<Value>> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn global_value(&self, key: &str) -> BackupResult<Option<Value>> {
        Ok(self.lock().globals.get(key).cloned())
    }

    fn set_value(&self, key: &str, value: Value) -> BackupResult<()> {
        self.lock().values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Read a string setting, falling back to `default` when absent or not a string
pub fn string_value(store: &dyn SettingsStore, key: &str, default: &str) -> BackupResult<String> {
    Ok(match store.value(key)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => default.to_string(),
        Some(other) => {
            return Err(type_mismatch(key, "a string", &other));
        }
    })
}

/// Read a boolean setting
pub fn bool_value(store: &dyn SettingsStore, key: &str, default: bool) -> BackupResult<bool> {
    Ok(match store.value(key)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Null) | None => default,
        Some(other) => return Err(type_mismatch(key, "a boolean", &other)),
    })
}

/// Read an integer setting
pub fn int_value(store: &dyn SettingsStore, key: &str, default: i64) -> BackupResult<i64> {
    Ok(match store.value(key)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::Null) | None => default,
        Some(other) => return Err(type_mismatch(key, "a number", &other)),
    })
}

/// Read a global string value
pub fn global_string(store: &dyn SettingsStore, key: &str) -> BackupResult<Option<String>> {
    Ok(match store.global_value(key)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn type_mismatch(key: &str, expected: &str, found: &Value) -> BackupError {
    BackupError::Settings(format!(
        "Setting '{}' should be {}, found {}",
        key, expected, found
    ))
}
