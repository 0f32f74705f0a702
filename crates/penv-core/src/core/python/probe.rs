use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::debug;

use super::check::{check_args, parse_verdict, version_args, VerdictKind};
use crate::effects::ProcessRunner;

/// Outcome of running the compatibility routine inside one candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompatibilityReport {
    pub candidate: PathBuf,
    pub kind: VerdictKind,
    pub diagnostic: String,
    pub version: Option<String>,
}

impl CompatibilityReport {
    #[must_use]
    pub fn compatible(&self) -> bool {
        self.kind.is_compatible()
    }

    fn rejected(candidate: &Path, kind: VerdictKind, diagnostic: String) -> Self {
        Self {
            candidate: candidate.to_path_buf(),
            kind,
            diagnostic,
            version: None,
        }
    }
}

/// Runs the embedded routine with `candidate`, bounded by `timeout`.
///
/// Never fails: spawn errors and timeouts are reported as incompatible
/// verdicts so the caller can move on to the next candidate.
pub fn probe(process: &dyn ProcessRunner, candidate: &Path, timeout: Duration) -> CompatibilityReport {
    let output = match process.run(candidate, &check_args(), Some(timeout)) {
        Ok(output) => output,
        Err(err) => {
            debug!(python = %candidate.display(), error = %err, "candidate could not be started");
            return CompatibilityReport::rejected(
                candidate,
                VerdictKind::SpawnFailed,
                format!("{err:#}"),
            );
        }
    };
    if output.timed_out {
        debug!(python = %candidate.display(), ?timeout, "candidate probe timed out");
        return CompatibilityReport::rejected(
            candidate,
            VerdictKind::Timeout,
            format!("compatibility check timed out after {}s", timeout.as_secs_f64()),
        );
    }
    let parsed = parse_verdict(&output);
    debug!(
        python = %candidate.display(),
        verdict = ?parsed.kind,
        diagnostic = %parsed.diagnostic,
        "probed candidate"
    );
    CompatibilityReport {
        candidate: candidate.to_path_buf(),
        kind: parsed.kind,
        diagnostic: parsed.diagnostic,
        version: parsed.version,
    }
}

/// Self-reported `major.minor.patch` of an interpreter.
///
/// # Errors
/// Returns an error when the interpreter cannot run or prints no version.
pub(crate) fn interpreter_version(
    process: &dyn ProcessRunner,
    python: &Path,
    timeout: Duration,
) -> Result<String> {
    let output = process
        .run(python, &version_args(), Some(timeout))
        .with_context(|| format!("failed to inspect python at {}", python.display()))?;
    if !output.success() {
        bail!(
            "python exited with {} while reporting its version",
            output.code
        );
    }
    let version = output.stdout.trim();
    if version.is_empty() {
        bail!("python at {} reported no version", python.display());
    }
    Ok(version.to_string())
}
