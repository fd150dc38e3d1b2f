// patchverify-net/src/build_server.rs
//! Build-server (TeamCity REST) artifact access.

use std::path::{Path, PathBuf};

use patchverify_common::config::Credentials;
use patchverify_common::error::{PatchVerifyError, Result};
use patchverify_common::model::patch::is_patch_file_name;
use patchverify_common::model::InstallerDescriptor;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::http::{authorize, build_http_client, download_to};
use crate::validation::validate_url;

#[derive(Debug, Deserialize)]
struct ArtifactListing {
    #[serde(default)]
    file: Vec<ArtifactEntry>,
}

#[derive(Debug, Deserialize)]
struct ArtifactEntry {
    name: String,
}

#[derive(Debug, Clone)]
pub struct BuildServerSource {
    base: Url,
    build_configuration_ids: Vec<String>,
    credentials: Option<Credentials>,
    client: Client,
}

impl BuildServerSource {
    pub fn new(
        server: &str,
        build_configuration_ids: Vec<String>,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        Ok(Self {
            base: validate_url(server)?,
            build_configuration_ids,
            credentials,
            client: build_http_client()?,
        })
    }

    pub fn describe(&self) -> String {
        format!(
            "build server {} [{}]",
            self.base,
            self.build_configuration_ids.join(";")
        )
    }

    fn rest_root(&self) -> String {
        let auth = if self.credentials.is_some() {
            "httpAuth"
        } else {
            "guestAuth"
        };
        format!("{}/{}/app/rest", self.base.as_str().trim_end_matches('/'), auth)
    }

    pub fn artifact_url(
        &self,
        build_configuration_id: &str,
        build_number: &str,
        file_name: &str,
    ) -> Result<Url> {
        parse(&format!(
            "{}/builds/buildType:(id:{}),number:{}/artifacts/content/{}",
            self.rest_root(),
            build_configuration_id,
            build_number,
            file_name
        ))
    }

    pub fn build_listing_url(&self, build_id: &str) -> Result<Url> {
        parse(&format!(
            "{}/builds/id:{}/artifacts/children/",
            self.rest_root(),
            build_id
        ))
    }

    pub fn build_artifact_url(&self, build_id: &str, file_name: &str) -> Result<Url> {
        parse(&format!(
            "{}/builds/id:{}/artifacts/content/{}",
            self.rest_root(),
            build_id,
            file_name
        ))
    }

    /// Looks for the installer in every configured build configuration, in
    /// order.
    pub async fn fetch(
        &self,
        descriptor: &InstallerDescriptor,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_name = descriptor.file_name();
        let target = dest_dir.join(&file_name);
        for configuration in &self.build_configuration_ids {
            let url = self.artifact_url(configuration, descriptor.build_number(), &file_name)?;
            debug!("Trying {} in build configuration {}", file_name, configuration);
            if let Some(path) =
                download_to(&self.client, &url, self.credentials.as_ref(), &target).await?
            {
                info!("Downloaded {} from {}", file_name, configuration);
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub async fn list_build_artifacts(&self, build_id: &str) -> Result<Vec<String>> {
        let url = self.build_listing_url(build_id)?;
        debug!("Listing artifacts of build {} via {}", build_id, url);
        let response = authorize(self.client.get(url.clone()), self.credentials.as_ref())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PatchVerifyError::HttpError(format!(
                "HTTP error {status} listing artifacts at {url}"
            )));
        }
        let body = response.text().await?;
        parse_listing(&body)
    }

    /// Downloads every patch artifact of `build_id` matching `marker` into
    /// `dest_dir`.
    pub async fn download_patches(
        &self,
        build_id: &str,
        marker: &str,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut downloaded = Vec::new();
        for name in self.list_build_artifacts(build_id).await? {
            if !is_patch_file_name(&name, marker) {
                debug!("Skipping build artifact {}", name);
                continue;
            }
            let url = self.build_artifact_url(build_id, &name)?;
            match download_to(
                &self.client,
                &url,
                self.credentials.as_ref(),
                &dest_dir.join(&name),
            )
            .await?
            {
                Some(path) => downloaded.push(path),
                None => {
                    return Err(PatchVerifyError::HttpError(format!(
                        "Listed artifact {name} of build {build_id} returned 404"
                    )))
                }
            }
        }
        info!(
            "Fetched {} patch artifact(s) from build {}",
            downloaded.len(),
            build_id
        );
        Ok(downloaded)
    }
}

fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| PatchVerifyError::Config(format!("Invalid URL '{url}': {e}")))
}

fn parse_listing(body: &str) -> Result<Vec<String>> {
    let listing: ArtifactListing = serde_json::from_str(body)?;
    Ok(listing.file.into_iter().map(|entry| entry.name).collect())
}
