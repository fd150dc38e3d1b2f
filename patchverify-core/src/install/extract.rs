// patchverify-core/src/install/extract.rs
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
#[cfg(unix)]
use std::os::unix::fs as unix_fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use patchverify_common::config::{Config, DEFAULT_DITTO};
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::platform::{Extraction, InstallerKind};
use tar::Archive;
use tracing::{debug, error, info};
use zip::read::ZipArchive;

use crate::process::run_tool;

/// Timing and external programs used while unpacking.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Wait after a silent installer returns.
    pub settle_delay: Duration,
    pub ditto: PathBuf,
}

impl ExtractOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            ditto: config.ditto.clone(),
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            ditto: PathBuf::from(DEFAULT_DITTO),
        }
    }
}

/// Unpacks `artifact` into `destination` with the strategy `kind` calls for.
///
/// `destination` is created first, whatever the strategy. For the silent
/// installer the call sleeps for the settle delay after the installer
/// process returns, since installers may still be writing files at that
/// point.
pub async fn extract(
    artifact: &Path,
    kind: InstallerKind,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<()> {
    debug!(
        "Extracting '{}' ({:?}) into '{}'",
        artifact.display(),
        kind.extraction(),
        destination.display()
    );
    fs::create_dir_all(destination).map_err(|e| {
        PatchVerifyError::Io(Arc::new(io::Error::new(
            e.kind(),
            format!(
                "Failed to create target directory {}: {}",
                destination.display(),
                e
            ),
        )))
    })?;

    match kind.extraction() {
        Extraction::SilentInstaller => {
            run_silent_installer(artifact, destination).await?;
            info!(
                "Installer returned, waiting {:?} for it to settle",
                options.settle_delay
            );
            tokio::time::sleep(options.settle_delay).await;
        }
        Extraction::Zip => {
            let (archive, target) = (artifact.to_path_buf(), destination.to_path_buf());
            blocking(move || {
                let file = open_archive(&archive)?;
                extract_zip_archive(BufReader::new(file), &target, &archive)
            })
            .await?;
        }
        Extraction::GzippedTar => {
            let (archive, target) = (artifact.to_path_buf(), destination.to_path_buf());
            blocking(move || extract_gzipped_tar(&archive, &target)).await?;
        }
        Extraction::Ditto => {
            let args = [
                OsStr::new("-x"),
                OsStr::new("-k"),
                artifact.as_os_str(),
                destination.as_os_str(),
            ];
            run_tool(&options.ditto, args, "ditto").await?;
        }
    }
    debug!("Finished extracting {}", artifact.display());
    Ok(())
}

async fn blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PatchVerifyError::Join(e.to_string()))?
}

/// NSIS-style unattended install: `/S` for silent, `/D=` for the target,
/// which must come last and stay unquoted.
async fn run_silent_installer(installer: &Path, destination: &Path) -> Result<()> {
    let target = format!("/D={}", destination.display());
    run_tool(installer, ["/S", target.as_str()], "installer").await?;
    Ok(())
}

fn open_archive(archive_path: &Path) -> Result<File> {
    File::open(archive_path).map_err(|e| {
        PatchVerifyError::Io(Arc::new(io::Error::new(
            e.kind(),
            format!("Failed to open archive {}: {}", archive_path.display(), e),
        )))
    })
}

/// Decompresses to an intermediate `.tar` next to the output, unpacks it and
/// removes the intermediate even when unpacking failed.
fn extract_gzipped_tar(archive_path: &Path, target_dir: &Path) -> Result<()> {
    let tar_path = target_dir.join(intermediate_tar_name(archive_path));
    debug!(
        "Decompressing {} to {}",
        archive_path.display(),
        tar_path.display()
    );
    {
        let mut decoder = GzDecoder::new(BufReader::new(open_archive(archive_path)?));
        let mut out = File::create(&tar_path)?;
        io::copy(&mut decoder, &mut out).map_err(|e| {
            PatchVerifyError::Extraction(format!(
                "Failed to decompress {}: {}",
                archive_path.display(),
                e
            ))
        })?;
    }

    let result = File::open(&tar_path)
        .map_err(PatchVerifyError::from)
        .and_then(|file| extract_tar_archive(BufReader::new(file), target_dir, archive_path));
    if let Err(e) = fs::remove_file(&tar_path) {
        error!(
            "Failed to remove intermediate archive {}: {}",
            tar_path.display(),
            e
        );
        result?;
        return Err(e.into());
    }
    result
}

fn intermediate_tar_name(archive_path: &Path) -> String {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.tar.gz".to_string());
    match name.strip_suffix(".gz") {
        Some(stem) => format!(".{stem}"),
        None => format!(".{name}.tar"),
    }
}

/// Resolves an archive entry path under `target_dir`, rejecting anything
/// that would land outside it.
fn safe_target_path(target_dir: &Path, entry_path: &Path) -> std::result::Result<PathBuf, String> {
    let mut target = target_dir.to_path_buf();
    for comp in entry_path.components() {
        match comp {
            Component::Normal(p) => target.push(p),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("Unsafe '..' in path {}", entry_path.display()))
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(format!(
                    "Disallowed component {:?} in path {}",
                    comp,
                    entry_path.display()
                ))
            }
        }
    }
    if target == target_dir {
        return Err(format!("Empty entry path {}", entry_path.display()));
    }
    Ok(target)
}

fn extract_tar_archive<R: Read>(
    reader: R,
    target_dir: &Path,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    debug!(
        "Starting TAR extraction for {}",
        archive_path_for_log.display()
    );
    let mut errors: Vec<String> = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result.map_err(|e| {
            PatchVerifyError::Extraction(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let path_in_archive = entry
            .path()
            .map_err(|e| {
                PatchVerifyError::Extraction(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?
            .into_owned();

        if path_in_archive.components().all(|c| c == Component::CurDir) {
            continue;
        }
        if let Err(msg) = safe_target_path(target_dir, &path_in_archive) {
            error!("{} in {}", msg, archive_path_for_log.display());
            errors.push(msg);
            continue;
        }

        // unpack_in resolves hard link targets against target_dir too.
        match entry.unpack_in(target_dir) {
            Ok(true) => {}
            Ok(false) => {
                let msg = format!(
                    "Skipped entry {} escaping {}",
                    path_in_archive.display(),
                    target_dir.display()
                );
                error!("{}", msg);
                errors.push(msg);
            }
            Err(e) => {
                let msg = format!(
                    "Failed to unpack entry {}: {}. Entry type: {:?}",
                    path_in_archive.display(),
                    e,
                    entry.header().entry_type()
                );
                error!("{}", msg);
                errors.push(msg);
            }
        }
    }

    if !errors.is_empty() {
        return Err(PatchVerifyError::Extraction(format!(
            "Failed during TAR extraction for {} with {} error(s): {}",
            archive_path_for_log.display(),
            errors.len(),
            errors.join("; ")
        )));
    }
    debug!(
        "Finished TAR extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}

fn extract_zip_archive<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        PatchVerifyError::Extraction(format!(
            "Failed to open ZIP {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;
    debug!(
        "Starting ZIP extraction for {}",
        archive_path_for_log.display()
    );

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            PatchVerifyError::Extraction(format!(
                "Error reading ZIP index {} in {}: {}",
                i,
                archive_path_for_log.display(),
                e
            ))
        })?;

        let path_in_archive = file.enclosed_name().ok_or_else(|| {
            PatchVerifyError::Extraction(format!(
                "Unsafe ZIP entry name {} in {}",
                file.name(),
                archive_path_for_log.display()
            ))
        })?;
        if path_in_archive.components().all(|c| c == Component::CurDir) {
            continue;
        }
        let target = safe_target_path(target_dir, &path_in_archive)
            .map_err(PatchVerifyError::Extraction)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        if file.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file.is_symlink() {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            let link_target = PathBuf::from(String::from_utf8_lossy(&buf).into_owned());
            #[cfg(unix)]
            {
                if target.symlink_metadata().is_ok() {
                    fs::remove_file(&target)?;
                }
                unix_fs::symlink(&link_target, &target)?;
            }
            #[cfg(not(unix))]
            {
                tracing::warn!(
                    "Cannot create symlink on non-unix system: {} -> {}",
                    target.display(),
                    link_target.display()
                );
            }
        } else {
            let mut out_file = File::create(&target).map_err(|e| {
                PatchVerifyError::Io(Arc::new(io::Error::new(
                    e.kind(),
                    format!("Failed create file {}: {}", target.display(), e),
                )))
            })?;
            io::copy(&mut file, &mut out_file)?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                if !file.is_symlink() && target.is_file() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                }
            }
        }
    }
    debug!(
        "Finished ZIP extraction for {}",
        archive_path_for_log.display()
    );
    Ok(())
}
