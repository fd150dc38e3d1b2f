// patchverify-core/src/process.rs
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use patchverify_common::error::{PatchVerifyError, Result};
use tokio::process::Command;
use tracing::{debug, error};

/// How an external command ended.
#[derive(Debug)]
pub enum Completion {
    Exited(Output),
    /// The deadline passed; the child has been killed.
    TimedOut,
}

/// Runs an external command to completion, capturing stdout and stderr.
///
/// With a `timeout` the child is killed when the deadline passes.
pub async fn run_command<I, S>(
    program: &Path,
    args: I,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Completion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());
    debug!("Running command: {:?} (timeout: {:?})", cmd.as_std(), timeout);

    let child = cmd.spawn().map_err(|e| {
        error!("Failed to execute {}: {}", program.display(), e);
        PatchVerifyError::CommandFailed(format!("{}: {e}", program.display()))
    })?;

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // Dropping the wait future drops the child, which kills it.
                error!(
                    "Command {} did not finish within {:?}, killed",
                    program.display(),
                    limit
                );
                return Ok(Completion::TimedOut);
            }
        },
        None => child.wait_with_output().await?,
    };

    if output.status.success() {
        debug!("Command {} finished successfully.", program.display());
    } else {
        debug!(
            "Command {} failed with status: {}",
            program.display(),
            output.status
        );
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Stderr:\n{}", stderr.trim());
        }
    }
    Ok(Completion::Exited(output))
}

/// Runs a tool that must succeed; a non-zero exit becomes `CommandFailed`
/// carrying the tool's stderr.
pub async fn run_tool<I, S>(program: &Path, args: I, what: &str) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    match run_command(program, args, None, None).await? {
        Completion::Exited(output) if output.status.success() => Ok(output),
        Completion::Exited(output) => Err(PatchVerifyError::CommandFailed(format!(
            "{what} failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
        Completion::TimedOut => Err(PatchVerifyError::CommandFailed(format!(
            "{what} timed out"
        ))),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_status() {
        let completion = run_command(Path::new("sh"), ["-c", "echo hi; exit 3"], None, None)
            .await
            .unwrap();
        match completion {
            Completion::Exited(output) => {
                assert_eq!(output.status.code(), Some(3));
                assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hi");
            }
            Completion::TimedOut => panic!("should not time out"),
        }
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let completion = run_command(
            Path::new("sh"),
            ["-c", "sleep 30"],
            None,
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert!(matches!(completion, Completion::TimedOut));
    }

    #[tokio::test]
    async fn failing_tool_reports_stderr() {
        let err = run_tool(Path::new("sh"), ["-c", "echo broken >&2; exit 1"], "unpack")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unpack failed"));
        assert!(msg.contains("broken"));
    }

    #[tokio::test]
    async fn missing_program_is_command_failure() {
        let err = run_command(
            Path::new("/nonexistent/patchverify-tool"),
            Vec::<String>::new(),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PatchVerifyError::CommandFailed(_)));
    }
}
