//! Settings CLI commands
//!
//! `init` seeds the settings file, `config` shows or edits it.

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Args, Subcommand};
use serde_json::Value;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::paths::{home_dir, resolve_backup_root, AppPaths, BACKUP_SUBFOLDER};
use crate::config::settings::{default_values, keys};
use crate::config::store::{global_string, JsonFileStore, SettingsStore};
use crate::error::{BackupError, BackupResult};

/// Options for `init`
#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Profile directory of the notes application
    #[arg(long)]
    pub profile_dir: Option<PathBuf>,

    /// Directory holding the notebooks to back up
    #[arg(long)]
    pub notes_dir: Option<PathBuf>,

    /// Backup path (absolute, or relative to the profile directory)
    #[arg(long)]
    pub path: Option<String>,

    /// Installation directory containing a bundled 7-Zip
    #[arg(long)]
    pub installation_dir: Option<PathBuf>,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show paths and settings
    Show,

    /// Set a backup setting
    Set {
        /// Setting key, e.g. backupRetention
        key: String,
        /// Value, parsed as JSON when possible
        value: String,
    },

    /// Set a host-level value (profileDir, notesDir, installationDir, sevenZipPath)
    SetGlobal {
        key: String,
        value: String,
    },
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Create the config directory and write defaults for missing settings
pub fn handle_init(paths: &AppPaths, store: &JsonFileStore, args: InitArgs) -> BackupResult<()> {
    println!("Initializing notes-backup at: {}", paths.base_dir().display());
    paths.ensure_directories()?;

    let mut file = store.load()?;
    let mut added = 0;
    for (key, value) in default_values() {
        if !file.values.contains_key(key) {
            file.values.insert(key.to_string(), value);
            added += 1;
        }
    }
    if let Some(path) = args.path {
        file.values.insert(keys::PATH.to_string(), Value::from(path));
    }

    let globals = [
        (keys::GLOBAL_PROFILE_DIR, args.profile_dir),
        (keys::GLOBAL_NOTES_DIR, args.notes_dir),
        (keys::GLOBAL_INSTALLATION_DIR, args.installation_dir),
    ];
    for (key, dir) in globals {
        if let Some(dir) = dir {
            let dir = absolute(dir)?;
            file.globals
                .insert(key.to_string(), Value::from(dir.display().to_string()));
        }
    }
    store.save(&file)?;

    println!("Initialization complete! ({} default settings written)", added);
    if !file.globals.contains_key(keys::GLOBAL_PROFILE_DIR) {
        println!();
        println!("Set the profile directory with:");
        println!("  notes-backup config set-global profileDir <DIR>");
    }
    Ok(())
}

/// Handle a config command
pub fn handle_config_command(
    paths: &AppPaths,
    store: &JsonFileStore,
    cmd: Option<ConfigCommands>,
) -> BackupResult<()> {
    match cmd.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => show_config(paths, store),
        ConfigCommands::Set { key, value } => {
            store.set_value(&key, parse_value(&value))?;
            println!("Set {} = {}", key, display_value(&key, &parse_value(&value)));
            Ok(())
        }
        ConfigCommands::SetGlobal { key, value } => {
            store.set_global(&key, Value::from(value.clone()))?;
            println!("Set global {} = {}", key, value);
            Ok(())
        }
    }
}

fn show_config(paths: &AppPaths, store: &JsonFileStore) -> BackupResult<()> {
    let file = store.load()?;

    println!("notes-backup Configuration");
    println!("==========================");
    println!("Config directory: {}", paths.base_dir().display());
    println!("Settings file:    {}", store.path().display());

    match global_string(store, keys::GLOBAL_PROFILE_DIR)? {
        Some(profile_dir) => {
            let configured = file
                .values
                .get(keys::PATH)
                .and_then(Value::as_str)
                .unwrap_or_default();
            let create_subfolder = file
                .values
                .get(keys::CREATE_SUBFOLDER)
                .and_then(Value::as_bool)
                .unwrap_or(true);
            match resolve_root_preview(configured, &profile_dir, create_subfolder) {
                Ok(root) => println!("Backup root:      {}", root.display()),
                Err(e) => println!("Backup root:      ({})", e),
            }
            println!("Profile:          {}", profile_dir);
        }
        None => println!("Profile:          (not set)"),
    }
    if let Some(notes_dir) = global_string(store, keys::GLOBAL_NOTES_DIR)? {
        println!("Notes:            {}", notes_dir);
    }
    println!("Checked at:       {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!();

    if file.values.is_empty() {
        println!("No settings stored. Run 'notes-backup init' first.");
        return Ok(());
    }

    let rows: Vec<SettingRow> = file
        .values
        .iter()
        .filter(|(key, _)| key.as_str() != keys::BACKUP_INFO)
        .map(|(key, value)| SettingRow {
            key: key.clone(),
            value: display_value(key, value),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}

/// Resolve the root without creating the subfolder
fn resolve_root_preview(
    configured: &str,
    profile_dir: &str,
    create_subfolder: bool,
) -> BackupResult<PathBuf> {
    let resolved = resolve_backup_root(
        configured,
        Path::new(profile_dir),
        home_dir().as_deref(),
        false,
    )?;
    Ok(if create_subfolder {
        resolved.path.join(BACKUP_SUBFOLDER)
    } else {
        resolved.path
    })
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw))
}

fn display_value(key: &str, value: &Value) -> String {
    let secret = key == keys::PASSWORD || key == keys::PASSWORD_REPEAT;
    match value {
        Value::String(s) if secret && !s.is_empty() => "********".to_string(),
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

fn absolute(path: PathBuf) -> BackupResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| BackupError::Io(format!("Failed to read current directory: {}", e)))?;
    Ok(cwd.join(path))
}
