// patchverify-net/src/validation.rs
use patchverify_common::error::{PatchVerifyError, Result};
use url::Url;

/// Parses a build-server URL. Only http(s) is accepted; plain http is
/// allowed but logged since credentials travel in clear text.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| PatchVerifyError::Config(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            tracing::warn!(
                "Build server URL '{}' is not https; credentials are sent unencrypted",
                url_str
            );
            Ok(url)
        }
        other => Err(PatchVerifyError::Config(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https_only() {
        assert!(validate_url("https://builds.example.com").is_ok());
        assert!(validate_url("http://localhost:8111").is_ok());
        assert!(validate_url("ftp://builds.example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
