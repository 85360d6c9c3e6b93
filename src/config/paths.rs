//! Path management for notes-backup
//!
//! Resolves the application's own config directory and, more importantly, the
//! backup root a run writes into.
//!
//! ## Config directory resolution order
//!
//! 1. `NOTES_BACKUP_CONFIG_DIR` environment variable (if set)
//! 2. The platform config directory (`~/.config/notes-backup` on Linux)

use std::fs;
use std::path::{Component, Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};

use crate::error::{BackupError, BackupResult};

/// Subfolder appended to the backup root when `createSubfolder` is on
pub const BACKUP_SUBFOLDER: &str = "NotesBackup";

/// Manages the paths used by notes-backup itself
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Base directory for configuration
    base_dir: PathBuf,
}

impl AppPaths {
    /// Create a new AppPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var("NOTES_BACKUP_CONFIG_DIR") {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "notes-backup")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| BackupError::config("Could not determine config directory"))?
        };

        Ok(Self { base_dir })
    }

    /// Create AppPaths with a custom base directory
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    /// Ensure the config directory exists
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create config directory: {}", e)))
    }
}

/// The current user's home directory
pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Lexically normalize a path
///
/// Resolves `.` and `..` components and drops trailing separators without
/// touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Whether `child` is `parent` or lies somewhere below it
pub fn is_subdirectory_or_equal(parent: &Path, child: &Path) -> bool {
    let parent = normalize_path(parent);
    let child = normalize_path(child);
    if parent.as_os_str().is_empty() {
        return false;
    }
    child.starts_with(&parent)
}

/// The backup root computed from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    /// Absolute, normalized backup root
    pub path: PathBuf,
    /// Set when the subfolder could not be created; the root is still returned
    pub subfolder_error: Option<String>,
}

/// Resolve the backup root from the configured path
///
/// Relative paths are taken relative to `profile_dir`. The result must not be
/// the profile directory (or one of its ancestors) or the home directory.
pub fn resolve_backup_root(
    configured: &str,
    profile_dir: &Path,
    home_dir: Option<&Path>,
    create_subfolder: bool,
) -> BackupResult<ResolvedRoot> {
    let configured = configured.trim();
    if configured.is_empty() {
        return Err(BackupError::config("No backup path configured"));
    }

    let configured = Path::new(configured);
    let base = if configured.is_absolute() {
        normalize_path(configured)
    } else {
        normalize_path(&profile_dir.join(configured))
    };

    let mut root = base.clone();
    if create_subfolder {
        root.push(BACKUP_SUBFOLDER);
    }

    if is_subdirectory_or_equal(&root, profile_dir) {
        return Err(BackupError::config(format!(
            "The backup path '{}' must not be the profile directory or contain it",
            root.display()
        )));
    }

    if let Some(home) = home_dir {
        if normalize_path(home) == root {
            return Err(BackupError::config(format!(
                "The backup path '{}' must not be the home directory",
                root.display()
            )));
        }
    }

    let mut subfolder_error = None;
    if create_subfolder && !root.exists() && base.is_dir() {
        if let Err(e) = fs::create_dir(&root) {
            tracing::error!("Failed to create subfolder {}: {}", root.display(), e);
            subfolder_error = Some(format!(
                "Failed to create subfolder '{}': {}",
                root.display(),
                e
            ));
        }
    }

    Ok(ResolvedRoot {
        path: root,
        subfolder_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("settings.json"));
    }

    #[test]
    fn test_env_var_override() {
        let temp_dir = TempDir::new().unwrap();
        let custom_path = temp_dir.path().to_str().unwrap();

        env::set_var("NOTES_BACKUP_CONFIG_DIR", custom_path);
        let paths = AppPaths::new().unwrap();
        assert_eq!(paths.base_dir(), temp_dir.path());
        env::remove_var("NOTES_BACKUP_CONFIG_DIR");
    }

    #[cfg(unix)]
    #[test]
    fn test_is_subdirectory_or_equal_posix() {
        let cases = [
            ("/tmp/this/is/a/test", "/tmp/this/is/a/test", true),
            ("/tmp/test", "/tmp/test///", true),
            ("/tmp", "/tmp/test", true),
            ("/tmp/", "/tmp/test", true),
            ("/tmp/", "/tmp/..test", true),
            ("/tmp/test", "/tmp/", false),
            ("/tmp/", "/tmp/../test", false),
            ("/tmp/te", "/tmp/test", false),
            ("a", "/a", false),
            ("/a/b", "/b/c", false),
        ];

        for (parent, child, expected) in cases {
            assert_eq!(
                is_subdirectory_or_equal(Path::new(parent), Path::new(child)),
                expected,
                "is {} the parent of {}?",
                parent,
                child
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_path_resolves_against_profile() {
        let temp_dir = TempDir::new().unwrap();
        let profile = temp_dir.path().join("profile");
        fs::create_dir_all(profile.join("backups")).unwrap();

        let root = resolve_backup_root("backups/./", &profile, None, false).unwrap();
        assert_eq!(root.path, profile.join("backups"));
        assert!(root.subfolder_error.is_none());
    }

    #[test]
    fn test_subfolder_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let profile = temp_dir.path().join("profile");
        let target = temp_dir.path().join("target");
        fs::create_dir_all(&target).unwrap();

        let root =
            resolve_backup_root(target.to_str().unwrap(), &profile, None, true).unwrap();
        assert_eq!(root.path, target.join(BACKUP_SUBFOLDER));
        assert!(root.path.is_dir());
    }

    #[test]
    fn test_subfolder_not_created_without_parent() {
        let temp_dir = TempDir::new().unwrap();
        let profile = temp_dir.path().join("profile");
        let target = temp_dir.path().join("missing");

        let root =
            resolve_backup_root(target.to_str().unwrap(), &profile, None, true).unwrap();
        assert!(!root.path.exists());
    }

    #[test]
    fn test_rejects_empty_profile_and_home() {
        let temp_dir = TempDir::new().unwrap();
        let home = temp_dir.path().join("home");
        let profile = home.join(".config").join("notes");

        assert!(resolve_backup_root("  ", &profile, Some(&home), false)
            .unwrap_err()
            .is_config());
        assert!(resolve_backup_root(profile.to_str().unwrap(), &profile, Some(&home), false)
            .unwrap_err()
            .is_config());
        assert!(resolve_backup_root(home.to_str().unwrap(), &profile, Some(&home), false)
            .unwrap_err()
            .is_config());
        // Inside the profile is allowed
        assert!(resolve_backup_root("backup", &profile, Some(&home), false).is_ok());
    }
}
