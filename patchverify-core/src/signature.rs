// patchverify-core/src/signature.rs
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::platform::InstallerKind;
use tracing::debug;

use crate::process::{run_command, Completion};

/// The code-signed bundle a build root belongs to: the `.app` directory
/// above `Contents`.
pub fn bundle_for(build_root: &Path) -> PathBuf {
    match build_root.parent() {
        Some(parent) if build_root.file_name().is_some_and(|n| n == "Contents") => {
            parent.to_path_buf()
        }
        _ => build_root.to_path_buf(),
    }
}

/// Checks the code signature of the bundle containing `build_root` with the
/// `codesign` program.
///
/// Returns `Ok(None)` when `kind` has no signature to check, otherwise
/// whether the signature verified.
pub async fn verify(
    kind: InstallerKind,
    build_root: &Path,
    codesign: &Path,
) -> Result<Option<bool>> {
    if !kind.supports_signature_check() {
        debug!("No signature check for {} installers", kind);
        return Ok(None);
    }
    let bundle = bundle_for(build_root);
    debug!("Verifying code signature of {}", bundle.display());
    let args = [
        OsStr::new("--verify"),
        OsStr::new("--deep"),
        OsStr::new("--strict"),
        bundle.as_os_str(),
    ];
    match run_command(codesign, args, None, None).await? {
        Completion::Exited(output) => {
            if !output.status.success() {
                debug!(
                    "codesign rejected {}: {}",
                    bundle.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(Some(output.status.success()))
        }
        Completion::TimedOut => Err(PatchVerifyError::CommandFailed(
            "codesign timed out".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_is_the_app_directory() {
        assert_eq!(
            bundle_for(Path::new("/w/current/PyCharm.app/Contents")),
            PathBuf::from("/w/current/PyCharm.app")
        );
        assert_eq!(bundle_for(Path::new("/w/x")), PathBuf::from("/w/x"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_verifier_verdict_for_the_bundle() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let seen = tmp.path().join("seen.txt");
        let codesign = tmp.path().join("codesign");
        fs::write(
            &codesign,
            format!(
                "#!/bin/sh\nprintf '%s ' \"$@\" > '{}'\ncase \"$4\" in *Broken.app) exit 1;; esac\n",
                seen.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&codesign, fs::Permissions::from_mode(0o755)).unwrap();

        let good = tmp.path().join("PyCharm.app/Contents");
        assert_eq!(
            verify(InstallerKind::MacArchive, &good, &codesign).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            fs::read_to_string(&seen).unwrap().trim_end(),
            format!("--verify --deep --strict {}", tmp.path().join("PyCharm.app").display())
        );

        let broken = tmp.path().join("Broken.app/Contents");
        assert_eq!(
            verify(InstallerKind::MacArchive, &broken, &codesign).await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn other_formats_have_no_signature() {
        assert_eq!(
            verify(
                InstallerKind::LinuxTarball,
                Path::new("/nonexistent"),
                Path::new("codesign")
            )
                .await
                .unwrap(),
            None
        );
    }
}
