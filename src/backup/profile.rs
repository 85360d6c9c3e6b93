//! Profile data export
//!
//! Copies the user's application configuration (keymap, stylesheets,
//! settings, templates and optionally plugins) from the profile directory
//! into the staging area. Anything missing from the profile is skipped.

use std::path::Path;

use crate::error::BackupResult;
use crate::storage::file_io::{backup_file, backup_folder};

/// Single files copied from the profile root
pub const PROFILE_FILES: &[&str] = &[
    "keymap-desktop.json",
    "userchrome.css",
    "userstyle.css",
    "settings.json",
];

/// Staging subdirectory for profile data
pub const PROFILE_DIR: &str = "profile";

/// Staging subdirectory for note templates
pub const TEMPLATES_DIR: &str = "templates";

const PLUGINS_DIR: &str = "plugins";

/// What was copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileExport {
    pub files: Vec<String>,
    pub plugins: bool,
    pub templates: bool,
}

/// Copy profile data from `profile_dir` into `active`
pub fn export_profile(
    profile_dir: &Path,
    active: &Path,
    backup_plugins: bool,
) -> BackupResult<ProfileExport> {
    let target = active.join(PROFILE_DIR);
    let mut result = ProfileExport::default();

    for name in PROFILE_FILES {
        if backup_file(profile_dir.join(name), target.join(name))? {
            result.files.push((*name).to_string());
        }
    }

    if backup_plugins {
        result.plugins = backup_folder(profile_dir.join(PLUGINS_DIR), target.join(PLUGINS_DIR))?;
    }

    result.templates =
        backup_folder(profile_dir.join(TEMPLATES_DIR), active.join(TEMPLATES_DIR))?;

    tracing::info!(
        "Profile data exported: {} file(s), plugins: {}, templates: {}",
        result.files.len(),
        result.plugins,
        result.templates
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn profile() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("keymap-desktop.json"), "[]").unwrap();
        fs::write(root.join("userstyle.css"), "body {}").unwrap();
        fs::create_dir_all(root.join("plugins")).unwrap();
        fs::write(root.join("plugins").join("a.jpl"), "plugin").unwrap();
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("templates").join("daily.md"), "# Day").unwrap();
        temp_dir
    }

    #[test]
    fn test_export_profile() {
        let profile = profile();
        let staging = TempDir::new().unwrap();

        let result = export_profile(profile.path(), staging.path(), true).unwrap();

        assert_eq!(result.files, vec!["keymap-desktop.json", "userstyle.css"]);
        assert!(result.plugins);
        assert!(result.templates);
        let target = staging.path().join(PROFILE_DIR);
        assert_eq!(fs::read_to_string(target.join("userstyle.css")).unwrap(), "body {}");
        assert!(!target.join("userchrome.css").exists());
        assert!(target.join("plugins").join("a.jpl").is_file());
        assert!(staging.path().join(TEMPLATES_DIR).join("daily.md").is_file());
    }

    #[test]
    fn test_plugins_can_be_skipped() {
        let profile = profile();
        let staging = TempDir::new().unwrap();

        let result = export_profile(profile.path(), staging.path(), false).unwrap();

        assert!(!result.plugins);
        assert!(!staging.path().join(PROFILE_DIR).join("plugins").exists());
    }

    #[test]
    fn test_empty_profile() {
        let profile = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();

        let result = export_profile(profile.path(), staging.path(), true).unwrap();

        assert_eq!(result, ProfileExport::default());
    }
}
