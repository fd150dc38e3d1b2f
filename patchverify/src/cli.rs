// patchverify/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use patchverify_common::config::{Config, ConfigOptions};
use patchverify_common::error::Result;

pub mod plan;
pub mod run;

use crate::cli::plan::Plan;
use crate::cli::run::Run;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "patchverify", bin_name = "patchverify")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every trial and report service messages on stdout
    Run(Run),
    /// Show the trials a run would execute
    Plan(Plan),
}

impl Command {
    pub fn config_args(&self) -> &ConfigArgs {
        match self {
            Self::Run(command) => &command.config,
            Self::Plan(command) => &command.config,
        }
    }

    /// Returns whether the command succeeded in the sense of the process
    /// exit code.
    pub async fn run(&self, config: &Config) -> Result<bool> {
        match self {
            Self::Run(command) => command.run(config).await,
            Self::Plan(command) => command.run(config).await,
        }
    }
}

/// Configuration file plus per-option overrides; flags win over the file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Installer name prefix, e.g. pycharm
    #[arg(long)]
    pub product: Option<String>,
    /// Target platform: win, linux or mac
    #[arg(long)]
    pub platform: Option<String>,
    /// `;`-separated build configuration ids holding installers
    #[arg(long = "build-configuration-ids")]
    pub build_configuration_ids: Option<String>,
    /// Build whose artifacts are the patches under test
    #[arg(long)]
    pub build_id: Option<String>,
    /// `;`-separated installer formats, e.g. "exe;zip"
    #[arg(long)]
    pub custom_extensions: Option<String>,
    /// Directory for patch logs and fetched patches
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Base timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub auth_user_id: Option<String>,
    #[arg(long)]
    pub auth_password: Option<String>,
    /// Build server base URL
    #[arg(long)]
    pub server: Option<String>,
    /// Local directory of installers
    #[arg(long)]
    pub installers_dir: Option<PathBuf>,
    /// Local directory of patch artifacts
    #[arg(long)]
    pub patches: Option<PathBuf>,
    #[arg(long)]
    pub patch_marker: Option<String>,
    /// Parent directory for per-trial workspaces
    #[arg(long)]
    pub work_dir: Option<PathBuf>,
    /// Java launcher for the patch runner
    #[arg(long)]
    pub java: Option<PathBuf>,
    #[arg(long)]
    pub support_library: Option<String>,
    /// Check code signatures before and after patching (macOS)
    #[arg(long)]
    pub verify_signatures: bool,
    /// `ditto` program used to unpack macOS archives
    #[arg(long, value_name = "PATH")]
    pub ditto: Option<PathBuf>,
    /// `codesign` program used to verify signatures
    #[arg(long, value_name = "PATH")]
    pub codesign: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn overrides(&self) -> ConfigOptions {
        ConfigOptions {
            product: self.product.clone(),
            platform: self.platform.clone(),
            build_configuration_ids: self.build_configuration_ids.clone(),
            build_id: self.build_id.clone(),
            custom_extensions: self.custom_extensions.clone(),
            out: self.out.clone(),
            timeout: self.timeout,
            auth_user_id: self.auth_user_id.clone(),
            auth_password: self.auth_password.clone(),
            server: self.server.clone(),
            installers_dir: self.installers_dir.clone(),
            patches: self.patches.clone(),
            patch_marker: self.patch_marker.clone(),
            work_dir: self.work_dir.clone(),
            java: self.java.clone(),
            support_library: self.support_library.clone(),
            verify_signatures: self.verify_signatures.then_some(true),
            ditto: self.ditto.clone(),
            codesign: self.codesign.clone(),
        }
    }

    pub fn load(&self) -> Result<Config> {
        Config::load(self.config.as_deref(), self.overrides())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn flags_override_the_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("patchverify.toml");
        fs::write(
            &file,
            r#"
product = "pycharm"
platform = "win"
customExtensions = "exe;zip"
installersDir = "/srv/installers"
patches = "/srv/patches"
timeout = 30
"#,
        )
        .unwrap();

        let args = CliArgs::parse_from([
            "patchverify",
            "run",
            "--config",
            file.to_str().unwrap(),
            "--custom-extensions",
            "zip",
            "--timeout",
            "5",
        ]);
        let config = args.command.config_args().load().unwrap();
        assert_eq!(config.product, "pycharm");
        assert_eq!(config.installer_kinds.len(), 1);
        assert_eq!(config.timeout.as_secs(), 5);
        assert!(!config.verify_signatures);
    }

    #[test]
    fn verbose_is_global() {
        let args = CliArgs::parse_from(["patchverify", "plan", "-vv", "--product", "pycharm"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.command.config_args().product.as_deref(), Some("pycharm"));
    }
}
