use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use super::check::VerdictKind;
use super::probe::{probe, CompatibilityReport};
use crate::effects::ProcessRunner;
use crate::ProvisionError;

/// Newest first; the generic names come last.
const VERSIONED_MINORS: std::ops::RangeInclusive<u8> = 7..=13;

pub(crate) fn candidate_names(windows: bool) -> Vec<String> {
    let mut names: Vec<String> = VERSIONED_MINORS
        .rev()
        .map(|minor| format!("python3.{minor}"))
        .collect();
    names.push("python3".to_string());
    names.push("python".to_string());
    if windows {
        names.iter().map(|name| format!("{name}.exe")).collect()
    } else {
        names
    }
}

/// Existing interpreter files for every name, across `search_path` in order.
pub(crate) fn enumerate_candidates(search_path: &[PathBuf], windows: bool) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    for name in candidate_names(windows) {
        for dir in search_path {
            let candidate = dir.join(&name);
            if candidate.is_file() && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
    }
    found
}

/// Shell-style patterns; `*` does not cross path separators.
pub(crate) struct ExcludeSet {
    globs: GlobSet,
    literals: Vec<PathBuf>,
}

impl ExcludeSet {
    pub(crate) fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut literals = Vec::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "treating exclude pattern as a literal path");
                    literals.push(PathBuf::from(pattern));
                }
            }
        }
        let globs = builder.build().unwrap_or_else(|err| {
            warn!(error = %err, "ignoring exclude patterns");
            GlobSet::empty()
        });
        Self { globs, literals }
    }

    pub(crate) fn matches(&self, path: &Path) -> bool {
        self.globs.is_match(path) || self.literals.iter().any(|literal| literal == path)
    }
}

/// Ordered search for interpreters that pass the compatibility routine.
pub struct InterpreterDiscovery<'a> {
    process: &'a dyn ProcessRunner,
    search_path: &'a [PathBuf],
    current: Option<&'a Path>,
    probe_timeout: Duration,
    windows: bool,
}

impl<'a> InterpreterDiscovery<'a> {
    #[must_use]
    pub fn new(
        process: &'a dyn ProcessRunner,
        search_path: &'a [PathBuf],
        current: Option<&'a Path>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            process,
            search_path,
            current,
            probe_timeout,
            windows: cfg!(windows),
        }
    }

    /// Candidate list before exclusion and probing, current interpreter first.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = enumerate_candidates(self.search_path, self.windows);
        if let Some(current) = self.current {
            candidates.retain(|candidate| candidate != current);
            candidates.insert(0, current.to_path_buf());
        }
        candidates
    }

    /// Probes every non-excluded candidate and reports each verdict.
    pub fn survey(&self, exclude: &[String]) -> Vec<CompatibilityReport> {
        let exclude = ExcludeSet::new(exclude);
        self.candidates()
            .into_iter()
            .filter(|candidate| {
                let excluded = exclude.matches(candidate);
                if excluded {
                    debug!(python = %candidate.display(), "candidate excluded");
                }
                !excluded
            })
            .map(|candidate| {
                debug!(python = %candidate.display(), "checking a python candidate");
                probe(self.process, &candidate, self.probe_timeout)
            })
            .collect()
    }

    /// Compatible interpreters in preference order.
    ///
    /// # Errors
    /// With `strict`, an empty result is an error: `MissingVenvModule` when a
    /// candidate lacked the `venv` module, `NoCompatibleRuntime` otherwise.
    pub fn find_compatible(&self, exclude: &[String], strict: bool) -> Result<Vec<PathBuf>> {
        let reports = self.survey(exclude);
        let compatible: Vec<PathBuf> = reports
            .iter()
            .filter(|report| report.compatible())
            .map(|report| report.candidate.clone())
            .collect();
        if compatible.is_empty() && strict {
            if let Some(report) = reports
                .iter()
                .find(|report| report.kind == VerdictKind::MissingVenv)
            {
                return Err(ProvisionError::MissingVenvModule {
                    path: report.candidate.clone(),
                }
                .into());
            }
            return Err(ProvisionError::NoCompatibleRuntime {
                checked: reports.into_iter().map(|report| report.candidate).collect(),
            }
            .into());
        }
        Ok(compatible)
    }
}
