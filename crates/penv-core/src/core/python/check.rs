//! Compatibility routine executed inside each candidate interpreter.

use serde::{Deserialize, Serialize};

use crate::process::RunOutput;

const COMPAT_SCRIPT: &str = include_str!("compat_check.py");
const VERSION_SCRIPT: &str = "import platform; print(platform.python_version())";

/// Exit status the routine uses when `ensurepip`/`venv` cannot be imported.
pub(crate) const MISSING_VENV_EXIT: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Compatible,
    Incompatible,
    MissingVenv,
    Timeout,
    SpawnFailed,
}

impl VerdictKind {
    #[must_use]
    pub fn is_compatible(self) -> bool {
        matches!(self, Self::Compatible)
    }
}

#[derive(Debug, Deserialize)]
struct ScriptVerdict {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    version: String,
}

pub(crate) fn check_args() -> Vec<String> {
    vec!["-c".to_string(), COMPAT_SCRIPT.to_string()]
}

pub(crate) fn version_args() -> Vec<String> {
    vec!["-c".to_string(), VERSION_SCRIPT.to_string()]
}

/// Verdict parsed from a finished (not timed out) routine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedVerdict {
    pub kind: VerdictKind,
    pub diagnostic: String,
    pub version: Option<String>,
}

/// Classifies a run by exit status; the JSON line only refines the
/// diagnostic and version.
pub(crate) fn parse_verdict(output: &RunOutput) -> ParsedVerdict {
    let kind = match output.code {
        0 => VerdictKind::Compatible,
        MISSING_VENV_EXIT => VerdictKind::MissingVenv,
        _ => VerdictKind::Incompatible,
    };
    let verdict = output
        .stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ScriptVerdict>(line).ok());
    let (reason, version) = match verdict {
        Some(verdict) => (verdict.reason, Some(verdict.version).filter(|v| !v.is_empty())),
        None => (String::new(), None),
    };
    let diagnostic = if !reason.is_empty() {
        reason
    } else if kind.is_compatible() {
        String::new()
    } else {
        let captured = output.combined();
        if captured.is_empty() {
            format!("exited with status {}", output.code)
        } else {
            captured
        }
    };
    ParsedVerdict {
        kind,
        diagnostic,
        version,
    }
}
