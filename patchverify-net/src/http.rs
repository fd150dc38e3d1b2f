// patchverify-net/src/http.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use patchverify_common::config::Credentials;
use patchverify_common::error::{PatchVerifyError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::fs::{self, File as TokioFile};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use url::Url;

// Installers are large; the whole transfer has to fit in this window.
const DOWNLOAD_TIMEOUT_SECS: u64 = 1800;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "patchverify (Rust)";

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| PatchVerifyError::HttpError(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn authorize(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(&c.user, Some(&c.password)),
        None => request,
    }
}

/// Downloads `url` to `final_path` through a temporary sibling file.
///
/// Returns `Ok(None)` when the server answers 404 so callers can fall back
/// to another source; any other non-success status is an error.
pub async fn download_to(
    client: &Client,
    url: &Url,
    credentials: Option<&Credentials>,
    final_path: &Path,
) -> Result<Option<PathBuf>> {
    let temp_filename = format!(
        ".{}.download",
        final_path.file_name().unwrap_or_default().to_string_lossy()
    );
    let temp_path = final_path.with_file_name(temp_filename);
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    debug!("Downloading {} to {}", url, temp_path.display());
    let mut response = authorize(client.get(url.clone()), credentials)
        .send()
        .await
        .map_err(|e| PatchVerifyError::HttpError(format!("HTTP request failed for {url}: {e}")))?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("HTTP error {} for URL {}: {}", status, url, body_text);
        return Err(PatchVerifyError::HttpError(format!(
            "HTTP error {status} for URL {url}: {body_text}"
        )));
    }

    let mut temp_file = TokioFile::create(&temp_path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PatchVerifyError::HttpError(format!("Failed to read body of {url}: {e}")))?
    {
        temp_file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    temp_file.flush().await?;
    drop(temp_file);
    debug!("Wrote {} bytes to {}", written, temp_path.display());

    fs::rename(&temp_path, final_path).await.map_err(|e| {
        PatchVerifyError::HttpError(format!(
            "Failed to move {} to {}: {e}",
            temp_path.display(),
            final_path.display()
        ))
    })?;
    Ok(Some(final_path.to_path_buf()))
}
