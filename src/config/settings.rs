//! Backup settings
//!
//! A typed snapshot of everything a run needs, read once from the settings
//! store at the start of the run. Invalid values are either rejected with a
//! configuration error or, where a safe default exists, reset and reported
//! through [`BackupSettings::warnings`].

use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use zeroize::Zeroizing;

use super::store::{bool_value, int_value, string_value, SettingsStore};
use crate::backup::naming::{valid_backup_set_template, DEFAULT_BACKUP_SET_NAME};
use crate::error::{BackupError, BackupResult};

/// Setting keys as stored by the host
pub mod keys {
    pub const PATH: &str = "path";
    pub const CREATE_SUBFOLDER: &str = "createSubfolder";
    pub const EXPORT_PATH: &str = "exportPath";
    pub const SINGLE_JEX: &str = "singleJex";
    pub const EXPORT_FORMAT: &str = "exportFormat";
    pub const BACKUP_RETENTION: &str = "backupRetention";
    pub const BACKUP_INTERVAL: &str = "backupInterval";
    pub const ONLY_ON_CHANGE: &str = "onlyOnChange";
    pub const USE_PASSWORD: &str = "usePassword";
    pub const PASSWORD: &str = "password";
    pub const PASSWORD_REPEAT: &str = "passwordRepeat";
    pub const LAST_BACKUP: &str = "lastBackup";
    pub const FILE_LOG_LEVEL: &str = "fileLogLevel";
    pub const ZIP_ARCHIVE: &str = "zipArchive";
    pub const COMPRESSION_LEVEL: &str = "compressionLevel";
    pub const BACKUP_SET_NAME: &str = "backupSetName";
    pub const BACKUP_PLUGINS: &str = "backupPlugins";
    pub const EXEC_FINISH_CMD: &str = "execFinishCmd";
    pub const BACKUP_INFO: &str = "backupInfo";

    /// Host-level (global) keys
    pub const GLOBAL_PROFILE_DIR: &str = "profileDir";
    pub const GLOBAL_NOTES_DIR: &str = "notesDir";
    pub const GLOBAL_INSTALLATION_DIR: &str = "installationDir";
    pub const GLOBAL_SEVEN_ZIP_PATH: &str = "sevenZipPath";
}

/// Largest accepted retention count
pub const MAX_RETENTION: u32 = 999;

const COMPRESSION_LEVELS: &[u8] = &[0, 1, 3, 5, 7, 9];

/// How staged content is compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArchiveMode {
    /// Files are placed as-is
    #[default]
    None,
    /// One archive per top-level staging entry
    PerItem,
    /// One archive for the whole backup set
    SingleArchive,
}

impl ArchiveMode {
    /// Parse the stored `zipArchive` value (`no`, `yes`, `yesone`)
    pub fn from_setting(value: &str) -> BackupResult<Self> {
        match value {
            "no" | "" => Ok(Self::None),
            "yes" => Ok(Self::PerItem),
            "yesone" => Ok(Self::SingleArchive),
            other => Err(BackupError::config(format!(
                "Unknown archive mode '{}'",
                other
            ))),
        }
    }

    pub fn as_setting(&self) -> &'static str {
        match self {
            Self::None => "no",
            Self::PerItem => "yes",
            Self::SingleArchive => "yesone",
        }
    }
}

/// Format notebooks are exported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One `.jex` file per export call
    #[default]
    Jex,
    /// A directory tree per export call
    Raw,
}

impl ExportFormat {
    pub fn from_setting(value: &str) -> BackupResult<Self> {
        match value {
            "jex" | "" => Ok(Self::Jex),
            "raw" => Ok(Self::Raw),
            other => Err(BackupError::config(format!(
                "Unknown export format '{}'",
                other
            ))),
        }
    }

    /// Name of an export target with the given base name
    pub fn target_name(&self, base: &str) -> String {
        match self {
            Self::Jex => format!("{}.jex", base),
            Self::Raw => base.to_string(),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jex => write!(f, "jex"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Outcome of validating the password settings
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordState {
    /// Password protection is off
    Disabled,
    /// Both entries match and are not blank
    Enabled(Zeroizing<String>),
    /// Protection requested but entries differ or are blank
    Mismatch,
}

impl fmt::Debug for PasswordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Enabled(_) => write!(f, "Enabled(***)"),
            Self::Mismatch => write!(f, "Mismatch"),
        }
    }
}

/// Validate the password pair
pub fn check_password(use_password: bool, password: &str, repeat: &str) -> PasswordState {
    if !use_password {
        return PasswordState::Disabled;
    }
    if password == repeat && !password.trim().is_empty() {
        PasswordState::Enabled(Zeroizing::new(password.to_string()))
    } else {
        PasswordState::Mismatch
    }
}

/// Parse the `fileLogLevel` setting
pub fn parse_file_log_level(value: &str) -> LevelFilter {
    match value.to_ascii_lowercase().as_str() {
        "false" | "off" | "" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "info" => LevelFilter::INFO,
        "verbose" | "debug" => LevelFilter::DEBUG,
        other => {
            tracing::warn!("Unknown file log level '{}', using error", other);
            LevelFilter::ERROR
        }
    }
}

/// Retention count clamped to `1..=MAX_RETENTION`, with a warning when it
/// had to be raised
pub fn load_retention(store: &dyn SettingsStore) -> BackupResult<(u32, Option<String>)> {
    let retention = int_value(store, keys::BACKUP_RETENTION, 1)?;
    if retention < 1 {
        let warning = format!("Retention of {} is not allowed, keeping 1 backup", retention);
        return Ok((1, Some(warning)));
    }
    Ok((retention.min(MAX_RETENTION as i64) as u32, None))
}

/// Where backups are written
///
/// Read on its own by commands that only need the backup root; loading it
/// never writes to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLocation {
    /// Configured backup path (absolute or relative to the profile)
    pub path: String,
    pub create_subfolder: bool,
}

impl BackupLocation {
    pub fn load(store: &dyn SettingsStore) -> BackupResult<Self> {
        Ok(Self {
            path: string_value(store, keys::PATH, "")?,
            create_subfolder: bool_value(store, keys::CREATE_SUBFOLDER, true)?,
        })
    }
}

/// Settings the periodic trigger decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Hours between automatic backups, 0 disables them
    pub backup_interval_hours: u32,
    pub only_on_change: bool,
    /// Epoch milliseconds of the last successful run
    pub last_backup: i64,
}

impl ScheduleSettings {
    pub fn load(store: &dyn SettingsStore) -> BackupResult<Self> {
        Ok(Self {
            backup_interval_hours: int_value(store, keys::BACKUP_INTERVAL, 24)?.clamp(0, 999) as u32,
            only_on_change: bool_value(store, keys::ONLY_ON_CHANGE, false)?,
            last_backup: int_value(store, keys::LAST_BACKUP, 0)?,
        })
    }

    pub fn enabled(&self) -> bool {
        self.backup_interval_hours > 0
    }

    /// Whether the interval has passed since the last backup at `now_ms`
    pub fn interval_elapsed(&self, now_ms: i64) -> bool {
        let interval_ms = i64::from(self.backup_interval_hours) * 60 * 60 * 1000;
        self.enabled() && now_ms > self.last_backup.saturating_add(interval_ms)
    }
}

/// Settings snapshot for one run
#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Configured backup path (absolute or relative to the profile)
    pub path: String,
    pub create_subfolder: bool,
    /// Base directory for the staging area; empty means the backup root
    pub export_path: String,
    pub single_jex: bool,
    pub export_format: ExportFormat,
    pub retention: u32,
    pub password: PasswordState,
    pub file_log_level: LevelFilter,
    pub archive_mode: ArchiveMode,
    pub compression_level: u8,
    pub backup_set_name: String,
    pub backup_plugins: bool,
    pub exec_finish_cmd: String,
    /// Problems that were corrected while loading
    pub warnings: Vec<String>,
}

impl BackupSettings {
    /// Load and validate settings from the store
    ///
    /// `now` is used to check that the backup-set template renders to a
    /// valid file name. An invalid template is reset to the default in the
    /// store and reported as a warning.
    pub fn load<Tz: TimeZone>(store: &dyn SettingsStore, now: &DateTime<Tz>) -> BackupResult<Self> {
        let mut warnings = Vec::new();

        let (retention, warning) = load_retention(store)?;
        warnings.extend(warning);

        let compression_level = int_value(store, keys::COMPRESSION_LEVEL, 0)?;
        let compression_level = match u8::try_from(compression_level) {
            Ok(level) if COMPRESSION_LEVELS.contains(&level) => level,
            _ => {
                return Err(BackupError::config(format!(
                    "Compression level must be one of {:?}, got {}",
                    COMPRESSION_LEVELS, compression_level
                )))
            }
        };

        let mut backup_set_name =
            string_value(store, keys::BACKUP_SET_NAME, DEFAULT_BACKUP_SET_NAME)?;
        if !valid_backup_set_template(&backup_set_name, now) {
            warnings.push(format!(
                "Backup set name '{}' is not a valid file name, reset to '{}'",
                backup_set_name, DEFAULT_BACKUP_SET_NAME
            ));
            backup_set_name = DEFAULT_BACKUP_SET_NAME.to_string();
            store.set_value(
                keys::BACKUP_SET_NAME,
                Value::String(backup_set_name.clone()),
            )?;
        }

        let password = check_password(
            bool_value(store, keys::USE_PASSWORD, false)?,
            &string_value(store, keys::PASSWORD, "")?,
            &string_value(store, keys::PASSWORD_REPEAT, "")?,
        );

        let location = BackupLocation::load(store)?;

        Ok(Self {
            path: location.path,
            create_subfolder: location.create_subfolder,
            export_path: string_value(store, keys::EXPORT_PATH, "")?,
            single_jex: bool_value(store, keys::SINGLE_JEX, false)?,
            export_format: ExportFormat::from_setting(&string_value(
                store,
                keys::EXPORT_FORMAT,
                "jex",
            )?)?,
            retention,
            password,
            file_log_level: parse_file_log_level(&string_value(
                store,
                keys::FILE_LOG_LEVEL,
                "error",
            )?),
            archive_mode: ArchiveMode::from_setting(&string_value(
                store,
                keys::ZIP_ARCHIVE,
                "no",
            )?)?,
            compression_level,
            backup_set_name,
            backup_plugins: bool_value(store, keys::BACKUP_PLUGINS, true)?,
            exec_finish_cmd: string_value(store, keys::EXEC_FINISH_CMD, "")?,
            warnings,
        })
    }

    /// The password to protect archives with, if protection is enabled
    pub fn password(&self) -> Option<&str> {
        match &self.password {
            PasswordState::Enabled(pw) => Some(pw.as_str()),
            _ => None,
        }
    }

    /// Archive mode after applying the password rule
    ///
    /// Plaintext backups cannot be password protected, so a password forces
    /// at least per-item archives.
    pub fn effective_archive_mode(&self) -> ArchiveMode {
        match (self.archive_mode, self.password()) {
            (ArchiveMode::None, Some(_)) => ArchiveMode::PerItem,
            (mode, _) => mode,
        }
    }
}

/// Reset the stored password fields unless protection is validly enabled
pub fn enable_password(
    store: &dyn SettingsStore,
    state: &PasswordState,
) -> BackupResult<()> {
    if matches!(state, PasswordState::Enabled(_)) {
        return Ok(());
    }
    store.set_value(keys::PASSWORD, Value::String(String::new()))?;
    store.set_value(keys::PASSWORD_REPEAT, Value::String(String::new()))?;
    Ok(())
}

/// Default values written by `init`
pub fn default_values() -> Vec<(&'static str, Value)> {
    vec![
        (keys::PATH, Value::from("")),
        (keys::CREATE_SUBFOLDER, Value::from(true)),
        (keys::EXPORT_PATH, Value::from("")),
        (keys::SINGLE_JEX, Value::from(false)),
        (keys::EXPORT_FORMAT, Value::from("jex")),
        (keys::BACKUP_RETENTION, Value::from(1)),
        (keys::BACKUP_INTERVAL, Value::from(24)),
        (keys::ONLY_ON_CHANGE, Value::from(false)),
        (keys::USE_PASSWORD, Value::from(false)),
        (keys::PASSWORD, Value::from("")),
        (keys::PASSWORD_REPEAT, Value::from("")),
        (keys::LAST_BACKUP, Value::from(0)),
        (keys::FILE_LOG_LEVEL, Value::from("error")),
        (keys::ZIP_ARCHIVE, Value::from("no")),
        (keys::COMPRESSION_LEVEL, Value::from(0)),
        (keys::BACKUP_SET_NAME, Value::from(DEFAULT_BACKUP_SET_NAME)),
        (keys::BACKUP_PLUGINS, Value::from(true)),
        (keys::EXEC_FINISH_CMD, Value::from("")),
    ]
}
