// patchverify-core/src/patch.rs
//! Applying an update package to an installed build with the patch runner.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use patchverify_common::config::Config;
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::model::PatchArtifact;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::process::{run_command, Completion};

/// Version of the runner exit-code contract interpreted below.
pub const PATCH_RUNNER_PROTOCOL: u32 = 1;
pub const PATCH_RUNNER_MAIN_CLASS: &str = "com.intellij.updater.Runner";
pub const PATCH_RUNNER_MAX_HEAP: &str = "-Xmx500m";
pub const PATCH_FAILED_EXIT_CODE: i32 = -1;
pub const RESTART_REQUIRED_EXIT_CODE: i32 = 42;

/// Successful patch runner results. Both leave the tree fully patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// The runner wants the product restarted; harmless here.
    RestartRequired,
}

impl PatchOutcome {
    pub fn from_exit_code(code: i32) -> Result<Self> {
        match normalize_exit_code(code) {
            0 => Ok(PatchOutcome::Applied),
            RESTART_REQUIRED_EXIT_CODE => Ok(PatchOutcome::RestartRequired),
            PATCH_FAILED_EXIT_CODE => Err(PatchVerifyError::PatchFailed(PATCH_FAILED_EXIT_CODE)),
            other => Err(PatchVerifyError::PatchRunnerUnexpectedExit(other)),
        }
    }
}

/// The runner exits with -1; Unix truncates exit statuses to a byte.
fn normalize_exit_code(code: i32) -> i32 {
    if cfg!(unix) && code == 255 {
        PATCH_FAILED_EXIT_CODE
    } else {
        code
    }
}

#[derive(Debug, Clone)]
pub struct PatchApplier {
    java: PathBuf,
    support_library: String,
    timeout: std::time::Duration,
}

impl PatchApplier {
    /// Resolves the Java launcher: the configured path, then
    /// `$JAVA_HOME/bin/java`, then `java` on `PATH`.
    pub fn new(config: &Config) -> Result<Self> {
        let java = match &config.java {
            Some(path) => path.clone(),
            None => find_java()?,
        };
        debug!("Using Java launcher {}", java.display());
        Ok(Self {
            java,
            support_library: config.support_library.clone(),
            timeout: config.patch_timeout(),
        })
    }

    /// Locates the support library the runner needs on its classpath
    /// somewhere in the build being patched.
    pub fn find_support_library(&self, build_root: &Path) -> Result<PathBuf> {
        WalkDir::new(build_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                entry.file_type().is_file()
                    && entry.file_name().to_string_lossy() == self.support_library.as_str()
            })
            .map(|entry| entry.into_path())
            .ok_or_else(|| PatchVerifyError::MissingSupportLibrary {
                library: self.support_library.clone(),
                build_root: build_root.to_path_buf(),
            })
    }

    pub fn command_args(
        &self,
        patch: &Path,
        support_library: &Path,
        build_root: &Path,
    ) -> Result<Vec<OsString>> {
        let classpath = std::env::join_paths([patch, support_library]).map_err(|e| {
            PatchVerifyError::Config(format!("Cannot build runner classpath: {e}"))
        })?;
        Ok(vec![
            PATCH_RUNNER_MAX_HEAP.into(),
            "-cp".into(),
            classpath,
            PATCH_RUNNER_MAIN_CLASS.into(),
            "install".into(),
            build_root.as_os_str().to_os_string(),
        ])
    }

    /// Applies `patch` to the tree at `build_root` in place. Runner output
    /// goes to `log_path`.
    pub async fn apply(
        &self,
        patch: &PatchArtifact,
        build_root: &Path,
        log_path: &Path,
    ) -> Result<PatchOutcome> {
        let support_library = self.find_support_library(build_root)?;
        let args = self.command_args(&patch.path, &support_library, build_root)?;
        info!(
            "Applying {} to {}",
            patch.file_name(),
            build_root.display()
        );

        let output = match run_command(&self.java, &args, None, Some(self.timeout))
            .await?
        {
            Completion::Exited(output) => output,
            Completion::TimedOut => {
                error!("Patch runner timed out after {:?}", self.timeout);
                return Err(PatchVerifyError::PatchRunnerTimeout(self.timeout.as_secs()));
            }
        };
        let header = format!(
            "patch {} on {} (runner protocol {}, exit status {})",
            patch.file_name(),
            build_root.display(),
            PATCH_RUNNER_PROTOCOL,
            output.status
        );
        write_log(log_path, &header, &output.stdout, &output.stderr);

        let code = output.status.code().ok_or_else(|| {
            PatchVerifyError::CommandFailed(format!(
                "Patch runner terminated without an exit code ({})",
                output.status
            ))
        })?;
        match PatchOutcome::from_exit_code(code) {
            Ok(outcome) => {
                debug!("Patch runner finished: {:?}", outcome);
                Ok(outcome)
            }
            Err(e @ PatchVerifyError::PatchRunnerUnexpectedExit(_)) => {
                error!("{}; see {}", e, log_path.display());
                Err(e)
            }
            Err(e) => {
                warn!("{}; see {}", e, log_path.display());
                Err(e)
            }
        }
    }
}

fn find_java() -> Result<PathBuf> {
    let launcher = if cfg!(windows) { "java.exe" } else { "java" };
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        let candidate = PathBuf::from(home).join("bin").join(launcher);
        if candidate.is_file() {
            return Ok(candidate);
        }
        debug!("JAVA_HOME set but {} is missing", candidate.display());
    }
    which::which("java").map_err(|_| {
        PatchVerifyError::Config(
            "No Java runtime found: set 'java', JAVA_HOME, or put java on PATH".to_string(),
        )
    })
}

fn write_log(log_path: &Path, header: &str, stdout: &[u8], stderr: &[u8]) {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = Vec::with_capacity(header.len() + stdout.len() + stderr.len() + 32);
        content.extend_from_slice(header.as_bytes());
        content.extend_from_slice(b"\n== stdout ==\n");
        content.extend_from_slice(stdout);
        content.extend_from_slice(b"\n== stderr ==\n");
        content.extend_from_slice(stderr);
        fs::write(log_path, content)
    };
    if let Err(e) = write() {
        warn!("Failed to write patch log {}: {}", log_path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn applier(support_library: &str) -> PatchApplier {
        PatchApplier {
            java: PathBuf::from("java"),
            support_library: support_library.to_string(),
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[test]
    fn maps_exit_codes() {
        assert_eq!(PatchOutcome::from_exit_code(0).unwrap(), PatchOutcome::Applied);
        assert_eq!(
            PatchOutcome::from_exit_code(42).unwrap(),
            PatchOutcome::RestartRequired
        );
        assert!(matches!(
            PatchOutcome::from_exit_code(-1),
            Err(PatchVerifyError::PatchFailed(-1))
        ));
        assert!(matches!(
            PatchOutcome::from_exit_code(3),
            Err(PatchVerifyError::PatchRunnerUnexpectedExit(3))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn truncated_failure_code_is_a_patch_failure() {
        assert!(matches!(
            PatchOutcome::from_exit_code(255),
            Err(PatchVerifyError::PatchFailed(-1))
        ));
    }

    #[test]
    fn finds_support_library_anywhere_in_the_build() {
        let tmp = TempDir::new().unwrap();
        let lib = tmp.path().join("lib/ext/log4j.jar");
        fs::create_dir_all(lib.parent().unwrap()).unwrap();
        fs::write(&lib, b"jar").unwrap();
        assert_eq!(applier("log4j.jar").find_support_library(tmp.path()).unwrap(), lib);
    }

    #[test]
    fn missing_support_library_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = applier("log4j.jar")
            .find_support_library(tmp.path())
            .unwrap_err();
        assert!(matches!(err, PatchVerifyError::MissingSupportLibrary { .. }));
    }

    #[test]
    fn log_records_runner_protocol() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("logs/PY_1_2.patch.log");
        write_log(&log, "patch PY-1-2.jar on /b (runner protocol 1, exit status 0)", b"done", b"");
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.starts_with("patch PY-1-2.jar on /b (runner protocol 1"));
        assert!(text.contains("== stdout ==\ndone\n== stderr =="));
    }

    #[test]
    fn builds_runner_command_line() {
        let args = applier("log4j.jar")
            .command_args(
                Path::new("/p/PY-1-2.jar"),
                Path::new("/b/lib/log4j.jar"),
                Path::new("/b"),
            )
            .unwrap();
        let sep = if cfg!(windows) { ";" } else { ":" };
        let expected: Vec<OsString> = vec![
            "-Xmx500m".into(),
            "-cp".into(),
            format!("/p/PY-1-2.jar{sep}/b/lib/log4j.jar").into(),
            "com.intellij.updater.Runner".into(),
            "install".into(),
            "/b".into(),
        ];
        assert_eq!(args, expected);
    }
}
