use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pep440_rs::Version;
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use penv_domain::{EnvironmentState, StateStore, UPGRADE_CHECK_INTERVAL};

use super::upgrade::{auto_upgrade, UpgradeDecision};
use super::version::{check_version_spec, is_prerelease, reported_version};
use crate::core::errors::outcome_from_error;
use crate::core::python::check::VerdictKind;
use crate::core::python::probe::{interpreter_version, probe};
use crate::core::runtime::PENV_VERSION;
use crate::{CommandContext, ExecutionOutcome, ProvisionError};

/// File written inside a directory passed to `--dump-state`.
pub(crate) const DUMP_STATE_FILENAME: &str = "penv-state.json";

#[derive(Clone, Debug, Default)]
pub struct CheckPythonRequest {
    pub python: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct CheckEnvRequest {
    pub auto_upgrade: bool,
    pub dev: bool,
    pub dump_state: Option<PathBuf>,
    /// PEP 440 specifiers the toolchain version must satisfy, e.g. `>=6.1,<7`.
    pub version_spec: Option<String>,
}

impl Default for CheckEnvRequest {
    fn default() -> Self {
        Self {
            auto_upgrade: true,
            dev: false,
            dump_state: None,
            version_spec: None,
        }
    }
}

/// What `check env` found; also the document written by `--dump-state`.
#[derive(Clone, Debug, Serialize)]
pub struct EnvironmentReport {
    pub root: PathBuf,
    pub bin_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub python: PathBuf,
    pub python_version: Option<String>,
    pub toolchain: Option<PathBuf>,
    pub toolchain_version: Option<String>,
    pub installer_version: String,
    pub platform: String,
    /// Requested with `--dev` or implied by a pre-release toolchain.
    pub is_develop: bool,
    pub state: EnvironmentState,
}

/// Toolchain executable that answered `--version`.
struct ToolchainProbe {
    exe: PathBuf,
    version: Option<Version>,
}

/// Runs the compatibility routine against one interpreter.
///
/// # Errors
/// Returns an error only for failures that cannot be reported as an outcome.
pub fn check_python(ctx: &CommandContext, request: &CheckPythonRequest) -> Result<ExecutionOutcome> {
    let config = ctx.config();
    let requested = request
        .python
        .clone()
        .or_else(|| config.current_interpreter().cloned());
    let python = match requested {
        Some(python) => resolve_bare_name(&python, config.search_path()).unwrap_or(python),
        None => match default_interpreter(config.search_path()) {
            Some(python) => python,
            None => {
                return Ok(ProvisionError::NoCompatibleRuntime { checked: Vec::new() }.to_outcome());
            }
        },
    };

    let report = probe(ctx.process(), &python, config.probe().timeout);
    if report.compatible() {
        return Ok(ExecutionOutcome::success(
            format!("{} is compatible", python.display()),
            json!({
                "python": python.display().to_string(),
                "version": report.version,
                "verdict": report.kind,
            }),
        ));
    }
    let err = match report.kind {
        VerdictKind::MissingVenv => ProvisionError::MissingVenvModule { path: python },
        _ => ProvisionError::IncompatibleRuntime {
            path: python,
            reason: report.diagnostic,
        },
    };
    Ok(err.to_outcome())
}

fn resolve_bare_name(python: &Path, search_path: &[PathBuf]) -> Option<PathBuf> {
    if python.components().count() != 1 || python.exists() {
        return None;
    }
    which_in_search_path(&python.to_string_lossy(), search_path)
}

fn default_interpreter(search_path: &[PathBuf]) -> Option<PathBuf> {
    ["python3", "python"]
        .into_iter()
        .find_map(|name| which_in_search_path(name, search_path))
}

fn which_in_search_path(name: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    if search_path.is_empty() {
        return None;
    }
    let joined = std::env::join_paths(search_path).ok()?;
    let cwd = std::env::current_dir().ok()?;
    which::which_in(name, Some(joined), cwd).ok()
}

/// Re-validates the provisioned environment, then runs the rate-limited
/// toolchain upgrade.
///
/// # Errors
/// Returns an error only for failures that cannot be reported as an outcome.
pub fn check_env(ctx: &CommandContext, request: &CheckEnvRequest) -> Result<ExecutionOutcome> {
    match run_check_env(ctx, request, OffsetDateTime::now_utc()) {
        Ok(outcome) => Ok(outcome),
        Err(err) => Ok(outcome_from_error(&err)),
    }
}

fn run_check_env(
    ctx: &CommandContext,
    request: &CheckEnvRequest,
    now: OffsetDateTime,
) -> Result<ExecutionOutcome> {
    let config = ctx.config();
    let paths = config.paths();
    let root = ctx.environment_root()?;
    let store = StateStore::new(paths.state_file(&root));
    let Some(mut state) = store.read() else {
        return Err(ProvisionError::StateUnavailable { root }.into());
    };

    let live = config.platform().as_str();
    if state.host_platform_signature != live {
        return Err(ProvisionError::PlatformMismatch {
            recorded: state.host_platform_signature,
            live: live.to_string(),
        }
        .into());
    }

    let python = paths.interpreter_path(&root);
    if !python.is_file() {
        debug!(python = %python.display(), "environment interpreter is missing");
        return Err(ProvisionError::StateUnavailable { root }.into());
    }

    let mut toolchain = match config.toolchain().executable_stem() {
        Some(stem) => Some(validate_toolchain(ctx, &paths.executable_path(&root, stem))?),
        None => None,
    };
    let version = toolchain.as_ref().and_then(|probe| probe.version.as_ref());
    let is_develop = request.dev || version.is_some_and(is_prerelease);

    if let Some(spec) = &request.version_spec {
        if toolchain.is_some() {
            check_version_spec(version, spec)?;
        } else {
            warn!(spec = %spec, "no toolchain configured; skipping the version check");
        }
    }

    let upgrade = if request.auto_upgrade {
        Some(auto_upgrade(
            ctx.process(),
            &store,
            &mut state,
            toolchain.as_ref().map(|probe| probe.exe.as_path()),
            is_develop,
            UPGRADE_CHECK_INTERVAL,
            now,
        )?)
    } else {
        None
    };
    // Report what the upgrade left behind.
    if upgrade == Some(UpgradeDecision::Upgraded) {
        if let Some(previous) = toolchain.take() {
            toolchain = Some(validate_toolchain(ctx, &previous.exe)?);
        }
    }

    let python_version = match interpreter_version(ctx.process(), &python, config.probe().timeout) {
        Ok(version) => Some(version),
        Err(err) => {
            debug!(python = %python.display(), error = %err, "could not read environment python version");
            None
        }
    };

    let report = EnvironmentReport {
        bin_dir: paths.binary_dir(&root),
        cache_dir: paths.cache_dir(&root)?,
        root,
        python,
        python_version,
        toolchain_version: toolchain
            .as_ref()
            .and_then(|probe| probe.version.as_ref())
            .map(ToString::to_string),
        toolchain: toolchain.map(|probe| probe.exe),
        installer_version: PENV_VERSION.to_string(),
        platform: live.to_string(),
        is_develop,
        state,
    };

    let dumped = match &request.dump_state {
        Some(target) => Some(dump_report(&report, target)?),
        None => None,
    };

    info!(root = %report.root.display(), "environment is valid");
    let message = format!("environment at {} is valid", report.root.display());
    let mut details = serde_json::to_value(&report)?;
    if let Value::Object(map) = &mut details {
        map.insert("upgrade".into(), json!(upgrade));
        map.insert("version_spec".into(), json!(request.version_spec));
        map.insert(
            "dump_state".into(),
            json!(dumped.map(|path| path.display().to_string())),
        );
    }
    Ok(ExecutionOutcome::success(message, details))
}

fn validate_toolchain(ctx: &CommandContext, exe: &Path) -> Result<ToolchainProbe> {
    if !exe.is_file() {
        return Err(ProvisionError::ToolchainInvalid {
            path: exe.to_path_buf(),
            reason: "executable not found".to_string(),
        }
        .into());
    }
    let args = vec!["--version".to_string()];
    let output = ctx
        .process()
        .run(exe, &args, Some(ctx.config().probe().timeout))
        .map_err(|err| ProvisionError::ToolchainInvalid {
            path: exe.to_path_buf(),
            reason: format!("{err:#}"),
        })?;
    if !output.success() {
        let reason = if output.timed_out {
            "`--version` timed out".to_string()
        } else {
            format!("`--version` exited with status {}", output.code)
        };
        return Err(ProvisionError::ToolchainInvalid {
            path: exe.to_path_buf(),
            reason,
        }
        .into());
    }
    let version = reported_version(&output.combined());
    debug!(toolchain = %exe.display(), version = ?version.as_ref().map(ToString::to_string), "toolchain responds");
    Ok(ToolchainProbe {
        exe: exe.to_path_buf(),
        version,
    })
}

fn dump_report(report: &EnvironmentReport, target: &Path) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(DUMP_STATE_FILENAME)
    } else {
        target.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut contents = serde_json::to_vec_pretty(report)?;
    contents.push(b'\n');
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
