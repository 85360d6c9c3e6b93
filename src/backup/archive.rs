//! Archive engine
//!
//! Thin async wrapper over the external 7-Zip binary. Expected tool failures
//! (non-zero exit codes) are returned as a [`ToolFailure`] value inside the
//! outer `Ok`, so callers decide what is fatal. Only conditions such as a
//! missing binary surface as [`BackupError`].
//!
//! Exit codes: <https://sevenzip.osdn.jp/chm/cmdline/exit_codes.htm>

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{BackupError, BackupResult};

/// Dummy password used to check whether an archive is encrypted
const CHECK_PASSWORD: &str = "notes-backup-wrong-password";

/// Exit code 7-Zip uses for fatal errors, including a wrong password
const EXIT_FATAL: i32 = 2;

/// A failed tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Process exit code, `None` if killed by a signal
    pub code: Option<i32>,
    /// Short description for logs and dialogs
    pub message: String,
    /// Combined stdout and stderr
    pub output: String,
}

impl ToolFailure {
    /// Whether the failure is 7-Zip rejecting a password
    pub fn is_wrong_password(&self) -> bool {
        self.code == Some(EXIT_FATAL) && self.output.contains("Wrong password")
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a tool invocation that ran to completion
pub type ToolResult<T> = Result<T, ToolFailure>;

/// One entry of an archive listing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveEntry {
    pub file_name: String,
    pub size: Option<u64>,
    pub method: Option<String>,
    pub encrypted: bool,
}

/// Extra switches for [`Archiver::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOption {
    /// Delete the source files once they are in the archive (`-sdel`)
    DeleteSource,
    /// Compression level 0-9 (`-mx`)
    CompressionLevel(u8),
}

impl AddOption {
    fn to_arg(self) -> String {
        match self {
            AddOption::DeleteSource => "-sdel".to_string(),
            AddOption::CompressionLevel(level) => format!("-mx{}", level.min(9)),
        }
    }
}

/// Operations the backup pipeline needs from an archive tool
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Add `source` (a file, directory or `dir/*` glob) to `archive`
    ///
    /// Appends when the archive already exists.
    async fn add(
        &self,
        archive: &Path,
        source: &Path,
        password: Option<&str>,
        options: &[AddOption],
    ) -> BackupResult<ToolResult<()>>;

    /// List the archive contents
    async fn list(
        &self,
        archive: &Path,
        password: Option<&str>,
    ) -> BackupResult<ToolResult<Vec<ArchiveEntry>>>;

    /// Test archive integrity, returning the tool's report
    async fn test(&self, archive: &Path, password: Option<&str>)
        -> BackupResult<ToolResult<String>>;

    /// Whether the archive needs a password
    ///
    /// Tests with a deliberately wrong password: only the tool's specific
    /// wrong-password failure counts as "protected". Any other failure is
    /// inconclusive and reported as `false`.
    async fn password_protected(&self, archive: &Path) -> BackupResult<bool> {
        match self.test(archive, Some(CHECK_PASSWORD)).await? {
            Ok(_) => Ok(false),
            Err(failure) => Ok(failure.is_wrong_password()),
        }
    }
}

/// [`Archiver`] backed by the 7-Zip command line tool
#[derive(Debug, Clone)]
pub struct SevenZip {
    binary: PathBuf,
}

impl SevenZip {
    /// Use the binary at `binary`
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Locate the binary
    ///
    /// An explicit override wins; otherwise the copy bundled under
    /// `<installation_dir>/7zip-bin/` is used when present, and `7za` from
    /// `PATH` as a last resort.
    pub fn resolve(override_path: Option<&Path>, installation_dir: Option<&Path>) -> Self {
        if let Some(path) = override_path {
            return Self::new(path);
        }

        if let Some(dir) = installation_dir {
            let bundled = dir.join("7zip-bin").join(bundled_binary_subpath());
            if bundled.is_file() {
                return Self::new(bundled);
            }
            tracing::debug!("No bundled 7-Zip at {}", bundled.display());
        }

        Self::new(default_binary_name())
    }

    /// Path of the binary in use
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: Vec<String>) -> BackupResult<ToolResult<String>> {
        tracing::debug!("7-Zip: {} {}", self.binary.display(), redact_args(&args).join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                BackupError::archive(format!(
                    "Failed to start 7-Zip at '{}': {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return Ok(Ok(stdout));
        }

        let code = output.status.code();
        let detail = stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        let message = match code {
            Some(code) if detail.is_empty() => format!("Exited with code {}", code),
            Some(code) => format!("Exited with code {}: {}", code, detail),
            None => "Terminated by signal".to_string(),
        };

        Ok(Err(ToolFailure {
            code,
            message,
            output: format!("{}\n{}", stdout, stderr),
        }))
    }
}

#[async_trait]
impl Archiver for SevenZip {
    async fn add(
        &self,
        archive: &Path,
        source: &Path,
        password: Option<&str>,
        options: &[AddOption],
    ) -> BackupResult<ToolResult<()>> {
        let args = add_args(archive, source, password, options);
        Ok(self.run(args).await?.map(|_| ()))
    }

    async fn list(
        &self,
        archive: &Path,
        password: Option<&str>,
    ) -> BackupResult<ToolResult<Vec<ArchiveEntry>>> {
        let mut args = vec![
            "l".to_string(),
            "-slt".to_string(),
            archive.to_string_lossy().to_string(),
        ];
        if let Some(pw) = password {
            args.push(format!("-p{}", pw));
        }
        Ok(self.run(args).await?.map(|out| parse_technical_listing(&out)))
    }

    async fn test(
        &self,
        archive: &Path,
        password: Option<&str>,
    ) -> BackupResult<ToolResult<String>> {
        let mut args = vec!["t".to_string(), archive.to_string_lossy().to_string()];
        if let Some(pw) = password {
            args.push(format!("-p{}", pw));
        }
        self.run(args).await
    }
}

/// Arguments for an `a` (add) invocation
fn add_args(
    archive: &Path,
    source: &Path,
    password: Option<&str>,
    options: &[AddOption],
) -> Vec<String> {
    let mut args = vec![
        "a".to_string(),
        archive.to_string_lossy().to_string(),
        source.to_string_lossy().to_string(),
    ];
    args.extend(options.iter().map(|o| o.to_arg()));
    if let Some(pw) = password {
        args.push(format!("-p{}", pw));
        // Encrypt file names too
        args.push("-mhe=on".to_string());
    }
    args
}

fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| {
            if a.starts_with("-p") && a.len() > 2 {
                "-p***".to_string()
            } else {
                a.clone()
            }
        })
        .collect()
}

/// Parse `7z l -slt` output
fn parse_technical_listing(output: &str) -> Vec<ArchiveEntry> {
    let Some((_, body)) = output.split_once("\n----------") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut current: Option<ArchiveEntry> = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Path" => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                current = Some(ArchiveEntry {
                    file_name: value.to_string(),
                    ..ArchiveEntry::default()
                });
            }
            "Size" => {
                if let Some(entry) = current.as_mut() {
                    entry.size = value.parse().ok();
                }
            }
            "Method" => {
                if let Some(entry) = current.as_mut() {
                    entry.method = Some(value.to_string());
                }
            }
            "Encrypted" => {
                if let Some(entry) = current.as_mut() {
                    entry.encrypted = value == "+";
                }
            }
            _ => {}
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }

    entries
}

fn bundled_binary_subpath() -> PathBuf {
    let platform = match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "win",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    };
    Path::new(platform).join(arch).join(default_binary_name())
}

fn default_binary_name() -> &'static str {
    if cfg!(windows) {
        "7za.exe"
    } else {
        "7za"
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeArchiver;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SLT_OUTPUT: &str = "\
7-Zip (a) 16.02 : Copyright (c) 1999-2016 Igor Pavlov : 2016-05-21

Listing archive: /tmp/file.7z

--
Path = /tmp/file.7z
Type = 7z
Physical Size = 150
Headers Size = 122
Method = 7zAES LZMA2:12
Solid = -
Blocks = 1

----------
Path = file.txt
Size = 4
Packed Size = 16
Modified = 2021-01-02 16:30:45
Attributes = A_ -rw-r--r--
CRC = 8C736521
Encrypted = +
Method = LZMA2:12 7zAES:19
Block = 0

Path = notes
Size = 0
Attributes = D_ drwxr-xr-x
Encrypted = -
";

    #[test]
    fn test_parse_technical_listing() {
        let entries = parse_technical_listing(SLT_OUTPUT);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_name, "file.txt");
        assert_eq!(entries[0].size, Some(4));
        assert!(entries[0].encrypted);
        assert!(entries[0].method.as_deref().unwrap().contains("AES"));
        assert_eq!(entries[1].file_name, "notes");
        assert!(!entries[1].encrypted);
    }

    #[test]
    fn test_parse_listing_without_entries() {
        assert!(parse_technical_listing("garbage").is_empty());
    }

    #[test]
    fn test_add_args() {
        let args = add_args(
            Path::new("/b/set.7z"),
            Path::new("/b/job/*"),
            Some("secret"),
            &[AddOption::CompressionLevel(5), AddOption::DeleteSource],
        );
        assert_eq!(
            args,
            vec!["a", "/b/set.7z", "/b/job/*", "-mx5", "-sdel", "-psecret", "-mhe=on"]
        );
        assert_eq!(redact_args(&args)[5], "-p***");
    }

    #[test]
    fn test_resolve_prefers_override_then_bundled() {
        let temp_dir = TempDir::new().unwrap();
        let override_bin = temp_dir.path().join("custom7z");
        assert_eq!(
            SevenZip::resolve(Some(&override_bin), Some(temp_dir.path())).binary(),
            override_bin.as_path()
        );

        assert_eq!(
            SevenZip::resolve(None, Some(temp_dir.path())).binary(),
            Path::new(default_binary_name())
        );

        let bundled = temp_dir.path().join("7zip-bin").join(bundled_binary_subpath());
        fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        fs::write(&bundled, "").unwrap();
        assert_eq!(
            SevenZip::resolve(None, Some(temp_dir.path())).binary(),
            bundled.as_path()
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let zip = SevenZip::new(temp_dir.path().join("no-such-7za"));
        let err = zip
            .test(&temp_dir.path().join("a.7z"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Archive(_)));
    }

    #[tokio::test]
    async fn test_encryption_check_with_fake() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "file").unwrap();
        let archiver = FakeArchiver::default();

        let plain = temp_dir.path().join("plain.7z");
        archiver.add(&plain, &file, None, &[]).await.unwrap().unwrap();
        assert!(!archiver.password_protected(&plain).await.unwrap());

        let locked = temp_dir.path().join("locked.7z");
        archiver
            .add(&locked, &file, Some("secret"), &[])
            .await
            .unwrap()
            .unwrap();
        assert!(archiver.password_protected(&locked).await.unwrap());

        // Not an archive at all: inconclusive, so not protected
        assert!(!archiver
            .password_protected(&temp_dir.path().join("missing.7z"))
            .await
            .unwrap());
    }

    /// A working 7-Zip binary, if this machine has one
    fn system_seven_zip() -> Option<SevenZip> {
        ["7za", "7z"].into_iter().find_map(|bin| {
            std::process::Command::new(bin)
                .arg("i")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .ok()
                .filter(|s| s.success())
                .map(|_| SevenZip::new(bin))
        })
    }

    #[tokio::test]
    async fn test_seven_zip_add_and_list() {
        let Some(zip) = system_seven_zip() else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        let archive = temp_dir.path().join("file.7z");
        fs::write(&file, "file").unwrap();

        zip.add(&archive, &file, None, &[]).await.unwrap().unwrap();
        assert!(archive.exists());

        let entries = zip.list(&archive, None).await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name, "file.txt");
        assert!(!zip.password_protected(&archive).await.unwrap());
    }

    #[tokio::test]
    async fn test_seven_zip_password() {
        let Some(zip) = system_seven_zip() else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        let archive = temp_dir.path().join("file.7z");
        fs::write(&file, "file").unwrap();

        zip.add(&archive, &file, Some("secret"), &[])
            .await
            .unwrap()
            .unwrap();

        let wrong = zip.test(&archive, Some("wrongpassword")).await.unwrap();
        assert_eq!(wrong.unwrap_err().code, Some(2));
        assert!(zip.test(&archive, Some("secret")).await.unwrap().is_ok());
        assert!(zip.password_protected(&archive).await.unwrap());
    }

    #[tokio::test]
    async fn test_seven_zip_delete_source() {
        let Some(zip) = system_seven_zip() else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("backup.log");
        let archive = temp_dir.path().join("backuplog.7z");
        fs::write(&log, "log").unwrap();

        zip.add(&archive, &log, None, &[AddOption::DeleteSource])
            .await
            .unwrap()
            .unwrap();
        assert!(archive.exists());
        assert!(!log.exists());
    }
}
