// patchverify-common/src/config.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{PatchVerifyError, Result};
use crate::platform::{InstallerKind, Platform};

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_OUT_DIR: &str = "out";
pub const DEFAULT_PATCH_MARKER: &str = ".jar";
pub const DEFAULT_SUPPORT_LIBRARY: &str = "log4j.jar";
pub const DEFAULT_DITTO: &str = "ditto";
pub const DEFAULT_CODESIGN: &str = "codesign";
/// Patch application is slower than a plain install.
pub const PATCH_TIMEOUT_SCALE: u64 = 3;

/// Options as they appear in a config file or on the command line. Every
/// field is optional here; [`Config::from_options`] applies defaults and
/// rejects incomplete setups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOptions {
    pub product: Option<String>,
    pub platform: Option<String>,
    #[serde(rename = "buildConfigurationIDs", alias = "buildConfigurationID")]
    pub build_configuration_ids: Option<String>,
    pub build_id: Option<String>,
    pub custom_extensions: Option<String>,
    pub out: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub auth_user_id: Option<String>,
    pub auth_password: Option<String>,
    pub server: Option<String>,
    pub installers_dir: Option<PathBuf>,
    pub patches: Option<PathBuf>,
    pub patch_marker: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub java: Option<PathBuf>,
    pub support_library: Option<String>,
    pub verify_signatures: Option<bool>,
    pub ditto: Option<PathBuf>,
    pub codesign: Option<PathBuf>,
}

impl ConfigOptions {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration file {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            PatchVerifyError::Config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Fields set in `overrides` win.
    pub fn merge(self, overrides: ConfigOptions) -> Self {
        Self {
            product: overrides.product.or(self.product),
            platform: overrides.platform.or(self.platform),
            build_configuration_ids: overrides
                .build_configuration_ids
                .or(self.build_configuration_ids),
            build_id: overrides.build_id.or(self.build_id),
            custom_extensions: overrides.custom_extensions.or(self.custom_extensions),
            out: overrides.out.or(self.out),
            timeout: overrides.timeout.or(self.timeout),
            auth_user_id: overrides.auth_user_id.or(self.auth_user_id),
            auth_password: overrides.auth_password.or(self.auth_password),
            server: overrides.server.or(self.server),
            installers_dir: overrides.installers_dir.or(self.installers_dir),
            patches: overrides.patches.or(self.patches),
            patch_marker: overrides.patch_marker.or(self.patch_marker),
            work_dir: overrides.work_dir.or(self.work_dir),
            java: overrides.java.or(self.java),
            support_library: overrides.support_library.or(self.support_library),
            verify_signatures: overrides.verify_signatures.or(self.verify_signatures),
            ditto: overrides.ditto.or(self.ditto),
            codesign: overrides.codesign.or(self.codesign),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable run configuration, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub product: String,
    pub platform: Platform,
    pub installer_kinds: Vec<InstallerKind>,
    pub build_configuration_ids: Vec<String>,
    pub build_id: Option<String>,
    pub out_dir: PathBuf,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
    pub server: Option<String>,
    pub installers_dir: Option<PathBuf>,
    pub patches_dir: Option<PathBuf>,
    pub patch_marker: String,
    pub work_dir: Option<PathBuf>,
    pub java: Option<PathBuf>,
    pub support_library: String,
    pub verify_signatures: bool,
    /// macOS archive unpacker.
    pub ditto: PathBuf,
    /// macOS signature verifier.
    pub codesign: PathBuf,
}

impl Config {
    pub fn load(file: Option<&Path>, overrides: ConfigOptions) -> Result<Self> {
        let base = match file {
            Some(path) => ConfigOptions::from_file(path)?,
            None => ConfigOptions::default(),
        };
        Self::from_options(base.merge(overrides))
    }

    pub fn from_options(options: ConfigOptions) -> Result<Self> {
        let product = required(options.product, "product")?;
        let platform: Platform = required(options.platform, "platform")?.parse()?;

        let installer_kinds = match non_empty(options.custom_extensions) {
            Some(list) => split_list(&list)
                .iter()
                .map(|ext| InstallerKind::for_platform(platform, ext))
                .collect::<Result<Vec<_>>>()?,
            None => platform.default_kinds(),
        };
        if installer_kinds.is_empty() {
            return Err(PatchVerifyError::Config(
                "No installer formats configured".to_string(),
            ));
        }

        let timeout_secs = options.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(PatchVerifyError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if timeout_secs
            .checked_mul(PATCH_TIMEOUT_SCALE)
            .and_then(|secs| u32::try_from(secs).ok())
            .is_none()
        {
            return Err(PatchVerifyError::Config(format!(
                "timeout of {timeout_secs} seconds is too large"
            )));
        }

        let credentials = match (
            non_empty(options.auth_user_id),
            non_empty(options.auth_password),
        ) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            (None, None) => None,
            _ => {
                return Err(PatchVerifyError::Config(
                    "authUserId and authPassword must be set together".to_string(),
                ))
            }
        };

        let build_configuration_ids = options
            .build_configuration_ids
            .as_deref()
            .map(split_list)
            .unwrap_or_default();
        let server = non_empty(options.server).map(|s| s.trim_end_matches('/').to_string());
        let build_id = non_empty(options.build_id);

        let remote_installers = server.is_some() && !build_configuration_ids.is_empty();
        if options.installers_dir.is_none() && !remote_installers {
            return Err(PatchVerifyError::Config(
                "No installer source: set installersDir, or server and buildConfigurationIDs"
                    .to_string(),
            ));
        }
        if options.patches.is_none() && !(server.is_some() && build_id.is_some()) {
            return Err(PatchVerifyError::Config(
                "No patch source: set patches, or server and buildId".to_string(),
            ));
        }

        let config = Self {
            product,
            platform,
            installer_kinds,
            build_configuration_ids,
            build_id,
            out_dir: options
                .out
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR)),
            timeout: Duration::from_secs(timeout_secs),
            credentials,
            server,
            installers_dir: options.installers_dir,
            patches_dir: options.patches,
            patch_marker: non_empty(options.patch_marker)
                .unwrap_or_else(|| DEFAULT_PATCH_MARKER.to_string()),
            work_dir: options.work_dir,
            java: options.java,
            support_library: non_empty(options.support_library)
                .unwrap_or_else(|| DEFAULT_SUPPORT_LIBRARY.to_string()),
            verify_signatures: options.verify_signatures.unwrap_or(false),
            ditto: options
                .ditto
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DITTO)),
            codesign: options
                .codesign
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CODESIGN)),
        };
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Wait after launching a self-extracting installer. The installer
    /// detaches, so this is a settle heuristic and not a completion signal.
    pub fn settle_delay(&self) -> Duration {
        self.timeout
    }

    pub fn patch_timeout(&self) -> Duration {
        self.timeout.saturating_mul(PATCH_TIMEOUT_SCALE as u32)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.out_dir.clone()
    }

    pub fn fetched_patches_dir(&self) -> PathBuf {
        self.out_dir.join("patches")
    }

    pub fn patch_log_path(&self, trial_name: &str) -> PathBuf {
        let sanitized: String = trial_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        self.out_dir.join(format!("{sanitized}.patch.log"))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| PatchVerifyError::Config(format!("Required option '{key}' is not set")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_options() -> ConfigOptions {
        ConfigOptions {
            product: Some("pycharm".into()),
            platform: Some("win".into()),
            installers_dir: Some(PathBuf::from("/installers")),
            patches: Some(PathBuf::from("/patches")),
            ..Default::default()
        }
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_options(local_options()).unwrap();
        assert_eq!(
            config.installer_kinds,
            vec![InstallerKind::WindowsExecutable, InstallerKind::WindowsArchive]
        );
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.patch_timeout(), Duration::from_secs(1800));
        assert_eq!(config.patch_marker, ".jar");
        assert_eq!(config.support_library, "log4j.jar");
        assert_eq!(config.out_dir, PathBuf::from("out"));
        assert!(!config.verify_signatures);
        assert_eq!(config.ditto, PathBuf::from("ditto"));
        assert_eq!(config.codesign, PathBuf::from("codesign"));
    }

    #[test]
    fn oversized_timeout_is_rejected() {
        let mut options = local_options();
        options.timeout = Some(u64::MAX / 2);
        match Config::from_options(options) {
            Err(PatchVerifyError::Config(message)) => assert!(message.contains("too large")),
            other => panic!("unexpected {other:?}"),
        }

        let mut options = local_options();
        options.timeout = Some(3600);
        let config = Config::from_options(options).unwrap();
        assert_eq!(config.patch_timeout(), Duration::from_secs(3 * 3600));
    }

    #[test]
    fn missing_required_option_is_fatal() {
        let mut options = local_options();
        options.product = None;
        let err = Config::from_options(options).unwrap_err();
        assert!(err.to_string().contains("product"));

        let mut options = local_options();
        options.platform = Some("  ".into());
        assert!(Config::from_options(options).is_err());
    }

    #[test]
    fn custom_extensions_override_defaults() {
        let mut options = local_options();
        options.custom_extensions = Some("zip; ".into());
        let config = Config::from_options(options).unwrap();
        assert_eq!(config.installer_kinds, vec![InstallerKind::WindowsArchive]);

        let mut options = local_options();
        options.custom_extensions = Some("exe;tar.gz".into());
        assert!(matches!(
            Config::from_options(options),
            Err(PatchVerifyError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn requires_some_installer_and_patch_source() {
        let mut options = local_options();
        options.installers_dir = None;
        assert!(Config::from_options(options.clone()).is_err());

        options.server = Some("https://builds.example.com/".into());
        options.build_configuration_ids = Some("Py_Installers;Py_Installers_Old".into());
        let config = Config::from_options(options).unwrap();
        assert_eq!(config.server.as_deref(), Some("https://builds.example.com"));
        assert_eq!(config.build_configuration_ids.len(), 2);
    }

    #[test]
    fn credentials_come_in_pairs() {
        let mut options = local_options();
        options.auth_user_id = Some("ci".into());
        assert!(Config::from_options(options.clone()).is_err());
        options.auth_password = Some("secret".into());
        let config = Config::from_options(options).unwrap();
        let debug = format!("{:?}", config.credentials);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn loads_file_and_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patchverify.toml");
        fs::write(
            &path,
            r#"
product = "pycharm"
platform = "linux"
timeout = 30
installersDir = "/srv/installers"
patches = "/srv/patches"
buildConfigurationIDs = "A;B"
"#,
        )
        .unwrap();
        let overrides = ConfigOptions {
            timeout: Some(45),
            ..Default::default()
        };
        let config = Config::load(Some(&path), overrides).unwrap();
        assert_eq!(config.platform, Platform::Linux);
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.installer_kinds, vec![InstallerKind::LinuxTarball]);
        assert_eq!(config.build_configuration_ids, vec!["A", "B"]);
    }

    #[test]
    fn rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "produkt = \"x\"\n").unwrap();
        assert!(matches!(
            ConfigOptions::from_file(&path),
            Err(PatchVerifyError::Toml(_))
        ));
    }

    #[test]
    fn patch_log_names_are_file_safe() {
        let config = Config::from_options(local_options()).unwrap();
        let path = config.patch_log_path("PY 1.1 -> 1.2 (exe)");
        assert_eq!(path, PathBuf::from("out/PY_1.1____1.2__exe_.patch.log"));
    }
}
