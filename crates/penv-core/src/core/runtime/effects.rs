use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_LENGTH;
use tempfile::NamedTempFile;

use super::process::{run_command, run_command_passthrough, RunOutput};
use crate::core::net::build_http_client;

pub trait ProcessRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[String], timeout: Option<Duration>) -> Result<RunOutput>;
    fn run_passthrough(&self, program: &Path, args: &[String]) -> Result<RunOutput>;
}

pub trait HttpClient: Send + Sync {
    /// Size advertised by a `HEAD` request, when the server reports one.
    fn content_length(&self, url: &str) -> Result<Option<u64>>;
    /// Streams `url` into `dest`, replacing it only once the body is complete.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

pub trait Effects: Send + Sync {
    fn process(&self) -> &dyn ProcessRunner;
    fn http(&self) -> &dyn HttpClient;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    process: Arc<SystemProcessRunner>,
    http: Arc<SystemHttpClient>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            process: Arc::new(SystemProcessRunner),
            http: Arc::new(SystemHttpClient),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }

    fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }
}

struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &Path, args: &[String], timeout: Option<Duration>) -> Result<RunOutput> {
        run_command(program, args, timeout)
    }

    fn run_passthrough(&self, program: &Path, args: &[String]) -> Result<RunOutput> {
        run_command_passthrough(program, args)
    }
}

struct SystemHttpClient;

impl HttpClient for SystemHttpClient {
    fn content_length(&self, url: &str) -> Result<Option<u64>> {
        let client = build_http_client()?;
        let response = client
            .head(url)
            .send()
            .with_context(|| format!("failed to query {url}"))?
            .error_for_status()
            .with_context(|| format!("HEAD request failed for {url}"))?;
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok()))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let client = build_http_client()?;
        let mut response = client
            .get(url)
            .send()
            .with_context(|| format!("failed to download {url}"))?
            .error_for_status()
            .with_context(|| format!("download failed for {url}"))?;
        let parent = dest
            .parent()
            .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", dest.display()))?;
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        let mut file = NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temporary file in {}", parent.display()))?;
        response
            .copy_to(file.as_file_mut())
            .with_context(|| format!("failed to write {}", dest.display()))?;
        file.persist(dest)
            .with_context(|| format!("failed to persist {}", dest.display()))?;
        Ok(())
    }
}
