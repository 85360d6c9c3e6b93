//! Post-backup command
//!
//! Runs the user's `execFinishCmd` through the platform shell once a backup
//! has been placed and pruned. The destination of the finished backup is
//! passed in `NOTES_BACKUP_DESTINATION`. Failures are reported to the caller
//! as a [`ToolFailure`] and never fail the run.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::backup::archive::{ToolFailure, ToolResult};

/// Environment variable holding the backup destination
pub const DESTINATION_ENV: &str = "NOTES_BACKUP_DESTINATION";

/// Run `cmd` through the shell
pub async fn run_finish_command(cmd: &str, destination: &Path) -> ToolResult<()> {
    tracing::info!("Running post-backup command: {}", cmd);

    let mut child = shell(cmd);
    child
        .env(DESTINATION_ENV, destination)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = child.output().await.map_err(|e| ToolFailure {
        code: None,
        message: format!("Failed to execute '{}': {}", cmd, e),
        output: String::new(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !stdout.trim().is_empty() {
        tracing::debug!("Post-backup command output: {}", stdout.trim());
    }

    if output.status.success() {
        return Ok(());
    }

    let code = output.status.code();
    let message = match code {
        Some(code) => format!("Command '{}' exited with {}: {}", cmd, code, stderr.trim()),
        None => format!("Command '{}' was terminated by a signal", cmd),
    };
    Err(ToolFailure {
        code,
        message,
        output: format!("{}\n{}", stdout, stderr),
    })
}

#[cfg(not(windows))]
fn shell(cmd: &str) -> Command {
    let mut child = Command::new("sh");
    child.arg("-c").arg(cmd);
    child
}

#[cfg(windows)]
fn shell(cmd: &str) -> Command {
    let mut child = Command::new("cmd");
    child.arg("/C").arg(cmd);
    child
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_command_sees_destination() {
        let temp_dir = TempDir::new().unwrap();
        let marker = temp_dir.path().join("marker");
        let cmd = format!("echo \"${}\" > '{}'", DESTINATION_ENV, marker.display());

        run_finish_command(&cmd, Path::new("/backups/202101021630"))
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(&marker).unwrap().trim(),
            "/backups/202101021630"
        );
    }

    #[tokio::test]
    async fn test_failing_command() {
        let failure = run_finish_command("echo broken >&2; exit 3", Path::new("/tmp"))
            .await
            .unwrap_err();
        assert_eq!(failure.code, Some(3));
        assert!(failure.message.contains("broken"));
    }
}
