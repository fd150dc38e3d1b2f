#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use patchverify_common::config::{Config, ConfigOptions};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const LOG4J: (&str, &str) = ("lib/log4j.jar", "log4j");

/// Directory layout shared by the pipeline tests.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        for dir in ["installers", "patches", "out", "work"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.root.path().join(sub)
    }

    pub fn add_patch(&self, name: &str) -> PathBuf {
        let path = self.path("patches").join(name);
        fs::write(&path, b"patch").unwrap();
        path
    }

    /// `<installers>/<file_name>` as a gzipped tarball with every entry
    /// under `top/`, or at the archive root when `top` is empty.
    pub fn add_tarball(&self, file_name: &str, top: &str, files: &[(&str, &str)]) {
        let encoder = GzEncoder::new(
            File::create(self.path("installers").join(file_name)).unwrap(),
            Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            let name = if top.is_empty() {
                path.to_string()
            } else {
                format!("{top}/{path}")
            };
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    pub fn add_zip(&self, file_name: &str, top: &str, files: &[(&str, &str)]) {
        let mut writer =
            zip::ZipWriter::new(File::create(self.path("installers").join(file_name)).unwrap());
        let options = SimpleFileOptions::default();
        for (path, content) in files {
            writer.start_file(format!("{top}/{path}"), options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    /// An executable shell script named `name` in the fixture root.
    #[cfg(unix)]
    pub fn fake_tool(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A stand-in for the Java launcher: a shell script receiving the
    /// runner arguments, with the build root last in `$root`.
    #[cfg(unix)]
    pub fn fake_java(&self, body: &str) -> PathBuf {
        self.fake_tool("fake-java", &format!("for root; do :; done\n{body}"))
    }

    /// A `ditto -x -k <archive> <dir>` stand-in that unpacks gzipped
    /// tarballs, so `.sit` fixtures can be built with [`Fixture::add_tarball`].
    #[cfg(unix)]
    pub fn fake_ditto(&self) -> PathBuf {
        self.fake_tool("fake-ditto", "mkdir -p \"$4\"\nexec tar -xzf \"$3\" -C \"$4\"")
    }

    pub fn options(&self, platform: &str, java: &Path) -> ConfigOptions {
        ConfigOptions {
            product: Some("pycharm".into()),
            platform: Some(platform.into()),
            installers_dir: Some(self.path("installers")),
            patches: Some(self.path("patches")),
            out: Some(self.path("out")),
            work_dir: Some(self.path("work")),
            java: Some(java.to_path_buf()),
            ..Default::default()
        }
    }

    pub fn config(&self, platform: &str, java: &Path) -> Config {
        Config::from_options(self.options(platform, java)).unwrap()
    }

    pub fn leftover_workspaces(&self) -> usize {
        fs::read_dir(self.path("work")).unwrap().count()
    }
}
