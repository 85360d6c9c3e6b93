//! Command-line tests
//!
//! Every test points the binary at its own config directory so nothing
//! touches the user's real settings.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn cmd(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("notes-backup").unwrap();
    cmd.arg("--config-dir").arg(config_dir);
    cmd.env("RUST_LOG", "error");
    cmd
}

fn read_settings(config_dir: &Path) -> Value {
    let text = fs::read_to_string(config_dir.join("settings.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Profile, notes and backup directories plus an initialized config
fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("profile")).unwrap();
    fs::write(root.join("profile/userstyle.css"), "body {}").unwrap();
    fs::create_dir_all(root.join("notes/Work")).unwrap();
    fs::write(root.join("notes/Work/todo.md"), "- ship it").unwrap();
    fs::create_dir_all(root.join("notes/Empty")).unwrap();
    fs::create_dir_all(root.join("backups")).unwrap();

    cmd(&root.join("config"))
        .arg("init")
        .arg("--profile-dir")
        .arg(root.join("profile"))
        .arg("--notes-dir")
        .arg(root.join("notes"))
        .arg("--path")
        .arg(root.join("backups"))
        .assert()
        .success();
    temp
}

#[test]
fn test_no_command_prints_usage_hint() {
    let temp = TempDir::new().unwrap();
    cmd(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("notes-backup --help"));
}

#[test]
fn test_init_writes_settings() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");

    cmd(&config)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialization complete"))
        .stdout(predicate::str::contains("config set-global profileDir"));

    let settings = read_settings(&config);
    assert_eq!(settings["values"]["backupRetention"], Value::from(1));
    assert_eq!(settings["values"]["zipArchive"], Value::from("no"));
}

#[test]
fn test_config_redacts_password() {
    let temp = workspace();
    let config = temp.path().join("config");

    cmd(&config)
        .args(["config", "set", "password", "hunter2"])
        .assert()
        .success();

    cmd(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Settings file:"))
        .stdout(predicate::str::contains("NotesBackup"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_list_without_backups() {
    let temp = workspace();
    cmd(&temp.path().join("config"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found."));
}

#[test]
fn test_run_without_archive() {
    let temp = workspace();
    let config = temp.path().join("config");

    cmd(&config)
        .args(["config", "set", "fileLogLevel", "info"])
        .assert()
        .success();
    cmd(&config)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup completed"));

    let root = temp.path().join("backups/NotesBackup");
    assert!(root.join("notes/Work.jex").is_file());
    assert!(!root.join("notes/Empty.jex").exists());
    assert!(root.join("profile/userstyle.css").is_file());
    assert!(root.join("backup.log").is_file());
    assert!(!root.join("activeBackupJob").exists());

    let settings = read_settings(&config);
    assert!(settings["values"]["lastBackup"].as_i64().unwrap() > 0);
}

#[test]
fn test_run_with_retention_records_backup_set() {
    let temp = workspace();
    let config = temp.path().join("config");

    cmd(&config)
        .args(["config", "set", "backupRetention", "3"])
        .assert()
        .success();
    cmd(&config).arg("run").assert().success();

    let settings = read_settings(&config);
    let index = settings["values"]["backupInfo"].as_array().unwrap();
    assert_eq!(index.len(), 1);
    let name = index[0]["name"].as_str().unwrap();
    assert!(temp
        .path()
        .join("backups/NotesBackup")
        .join(name)
        .join("notes/Work.jex")
        .is_file());

    cmd(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(name))
        .stdout(predicate::str::contains("yes"));
}

#[test]
fn test_run_reports_missing_backup_path() {
    let temp = workspace();
    let config = temp.path().join("config");
    fs::remove_dir_all(temp.path().join("backups")).unwrap();

    cmd(&config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_run_requires_notes_dir() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config");
    cmd(&config).arg("init").assert().success();

    cmd(&config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("notesDir"));
}

#[test]
fn test_prune_keeps_newest() {
    let temp = workspace();
    let config = temp.path().join("config");
    let root = temp.path().join("backups/NotesBackup");
    fs::create_dir_all(&root).unwrap();
    for name in ["old", "mid", "new"] {
        fs::create_dir(root.join(name)).unwrap();
    }

    let mut settings = read_settings(&config);
    settings["values"]["backupRetention"] = Value::from(2);
    settings["values"]["backupInfo"] = serde_json::json!([
        { "name": "old", "date": 1000 },
        { "name": "mid", "date": 2000 },
        { "name": "new", "date": 3000 }
    ]);
    fs::write(
        config.join("settings.json"),
        serde_json::to_string_pretty(&settings).unwrap(),
    )
    .unwrap();

    cmd(&config)
        .arg("prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed: old"));

    assert!(!root.join("old").exists());
    assert!(root.join("mid").exists());
    assert!(root.join("new").exists());
}
