use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::debug;

use crate::core::runtime::PENV_VERSION;
use crate::effects::HttpClient;

/// Decide whether penv should honor standard proxy environment variables.
///
/// Behavior:
/// - `PENV_KEEP_PROXIES=1/true/yes/on` forces proxies on.
/// - `PENV_KEEP_PROXIES=0/false/no/off/""` forces proxies off.
/// - If unset, proxies are enabled only when at least one proxy env var is set.
pub(crate) fn keep_proxies() -> bool {
    match env::var("PENV_KEEP_PROXIES") {
        Ok(raw) => {
            let value = raw.trim().to_ascii_lowercase();
            !matches!(value.as_str(), "" | "0" | "false" | "no" | "off")
        }
        Err(_) => {
            const PROXY_KEYS: &[&str] = &[
                "HTTP_PROXY",
                "http_proxy",
                "HTTPS_PROXY",
                "https_proxy",
                "ALL_PROXY",
                "all_proxy",
                "NO_PROXY",
                "no_proxy",
            ];
            PROXY_KEYS.iter().any(|key| {
                env::var(key)
                    .ok()
                    .is_some_and(|value| !value.trim().is_empty())
            })
        }
    }
}

pub(crate) fn build_http_client() -> Result<Client> {
    let builder = Client::builder()
        .user_agent(format!("penv/{PENV_VERSION}"))
        .timeout(Duration::from_secs(60));
    let builder = if keep_proxies() {
        builder
    } else {
        builder.no_proxy()
    };
    builder.build().context("failed to build HTTP client")
}

/// File name component of a download URL.
pub(crate) fn filename_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Downloads `url` into `dest` unless a file of the advertised size is
/// already there.
pub(crate) fn fetch_cached(http: &dyn HttpClient, url: &str, dest: &Path) -> Result<PathBuf> {
    if let Ok(meta) = dest.metadata() {
        match http.content_length(url) {
            Ok(Some(expected)) if expected == meta.len() => {
                debug!(url, path = %dest.display(), "using cached download");
                return Ok(dest.to_path_buf());
            }
            Ok(_) => {}
            Err(err) => debug!(url, error = %err, "size check failed; downloading again"),
        }
    }
    debug!(url, path = %dest.display(), "downloading");
    http.download(url, dest)
        .with_context(|| format!("fetching {url}"))?;
    Ok(dest.to_path_buf())
}
