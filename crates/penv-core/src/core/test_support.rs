//! Scripted effect implementations shared by unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::effects::{Effects, HttpClient, ProcessRunner, SharedEffects};
use crate::process::RunOutput;

type Handler = dyn Fn(&Path, &[String]) -> Result<RunOutput> + Send + Sync;

/// Invocation recorded by [`FakeProcess`].
#[derive(Clone, Debug)]
pub(crate) struct Call {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub passthrough: bool,
}

impl Call {
    pub fn line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().filter(|arg| arg.len() < 200).cloned());
        parts.join(" ")
    }
}

pub(crate) struct FakeProcess {
    handler: Box<Handler>,
    calls: Mutex<Vec<Call>>,
}

impl FakeProcess {
    pub fn new(handler: impl Fn(&Path, &[String]) -> Result<RunOutput> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, program: &Path, args: &[String], passthrough: bool) -> Result<RunOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                program: program.to_path_buf(),
                args: args.to_vec(),
                passthrough,
            });
        }
        (self.handler)(program, args)
    }
}

impl ProcessRunner for FakeProcess {
    fn run(&self, program: &Path, args: &[String], _timeout: Option<Duration>) -> Result<RunOutput> {
        self.record(program, args, false)
    }

    fn run_passthrough(&self, program: &Path, args: &[String]) -> Result<RunOutput> {
        self.record(program, args, true)
    }
}

pub(crate) fn exit(code: i32, stdout: &str, stderr: &str) -> Result<RunOutput> {
    Ok(RunOutput {
        code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        timed_out: false,
    })
}

pub(crate) fn ok(stdout: &str) -> Result<RunOutput> {
    exit(0, stdout, "")
}

pub(crate) fn timed_out() -> Result<RunOutput> {
    Ok(RunOutput {
        code: -1,
        timed_out: true,
        ..RunOutput::default()
    })
}

pub(crate) fn not_spawnable(program: &Path) -> Result<RunOutput> {
    Err(anyhow!("failed to start {}", program.display()))
}

/// Whether `args` run the embedded compatibility routine.
pub(crate) fn is_probe(args: &[String]) -> bool {
    args.first().is_some_and(|arg| arg == "-c")
        && args.get(1).is_some_and(|script| script.contains("missing_venv"))
}

/// Whether `args` ask for the interpreter version.
pub(crate) fn is_version_query(args: &[String]) -> bool {
    args.first().is_some_and(|arg| arg == "-c")
        && args.get(1).is_some_and(|script| script.contains("python_version()"))
        && !is_probe(args)
}

pub(crate) fn verdict(status: &str, reason: &str, version: &str) -> String {
    serde_json::json!({
        "status": status,
        "reason": reason,
        "version": version,
        "executable": "/fake/python",
    })
    .to_string()
}

#[derive(Default)]
pub(crate) struct FakeHttp {
    bodies: HashMap<String, Vec<u8>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.downloads.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl HttpClient for FakeHttp {
    fn content_length(&self, url: &str) -> Result<Option<u64>> {
        self.bodies
            .get(url)
            .map(|body| Some(body.len() as u64))
            .ok_or_else(|| anyhow!("404 for {url}"))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if let Ok(mut calls) = self.downloads.lock() {
            calls.push(url.to_string());
        }
        let body = self.bodies.get(url).ok_or_else(|| anyhow!("404 for {url}"))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(())
    }
}

pub(crate) struct FakeEffects {
    pub process: Arc<FakeProcess>,
    pub http: Arc<FakeHttp>,
}

impl FakeEffects {
    pub fn shared(process: FakeProcess, http: FakeHttp) -> (SharedEffects, Arc<FakeProcess>, Arc<FakeHttp>) {
        let process = Arc::new(process);
        let http = Arc::new(http);
        let effects: SharedEffects = Arc::new(Self {
            process: process.clone(),
            http: http.clone(),
        });
        (effects, process, http)
    }
}

impl Effects for FakeEffects {
    fn process(&self) -> &dyn ProcessRunner {
        self.process.as_ref()
    }

    fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }
}
