use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use penv_domain::{
    bin_dir_name, executable_name, EnvironmentState, PathResolver, PlatformSignature, StateStore,
    CACHE_DIR_NAME,
};

use crate::core::fs::{remove_path, wipe_preserving};
use crate::core::net::{fetch_cached, filename_from_url};
use crate::core::python::portable::PortableRuntimeFetcher;
use crate::core::python::probe::interpreter_version;
use crate::core::runtime::PENV_VERSION;
use crate::effects::{HttpClient, ProcessRunner};
use crate::ProvisionError;

pub(crate) const VIRTUALENV_URL: &str = "https://bootstrap.pypa.io/virtualenv/virtualenv.pyz";

/// Ways of turning an interpreter into an isolated environment, cheapest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStrategy {
    LocalModule,
    LocalThirdPartyTool,
    DownloadedBuilderScript,
}

impl BuildStrategy {
    pub const ORDER: [BuildStrategy; 3] = [
        BuildStrategy::LocalModule,
        BuildStrategy::LocalThirdPartyTool,
        BuildStrategy::DownloadedBuilderScript,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildState {
    Empty,
    Attempting(usize),
    Succeeded(BuildStrategy),
    Exhausted,
}

/// One command line tried by a strategy.
#[derive(Debug, Clone)]
struct Invocation {
    program: PathBuf,
    args: Vec<String>,
}

impl Invocation {
    fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
        }
    }

    fn render(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub root: PathBuf,
    /// Interpreter inside the new environment.
    pub python: PathBuf,
    /// Interpreter the environment was built from.
    pub base_python: PathBuf,
    pub strategy: BuildStrategy,
    pub portable: bool,
    pub state: EnvironmentState,
}

/// Interpreter path a successful build leaves under `root`.
pub(crate) fn built_interpreter(root: &Path) -> PathBuf {
    root.join(bin_dir_name()).join(executable_name("python"))
}

pub struct EnvironmentBuilder<'a> {
    process: &'a dyn ProcessRunner,
    http: &'a dyn HttpClient,
    paths: &'a PathResolver,
    platform: &'a PlatformSignature,
    portable: PortableRuntimeFetcher<'a>,
    search_path: &'a [PathBuf],
    probe_timeout: Duration,
}

impl<'a> EnvironmentBuilder<'a> {
    #[must_use]
    pub fn new(
        process: &'a dyn ProcessRunner,
        http: &'a dyn HttpClient,
        paths: &'a PathResolver,
        platform: &'a PlatformSignature,
        portable: PortableRuntimeFetcher<'a>,
    ) -> Self {
        Self {
            process,
            http,
            paths,
            platform,
            portable,
            search_path: &[],
            probe_timeout: crate::config::DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Directories searched for a standalone `virtualenv` executable.
    #[must_use]
    pub fn with_search_path(mut self, search_path: &'a [PathBuf]) -> Self {
        self.search_path = search_path;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Builds the environment at `target` from the first interpreter that
    /// works, falling back to a portable runtime once.
    ///
    /// On success `target` holds a working interpreter and `state.json`; on
    /// failure `target` no longer exists.
    ///
    /// # Errors
    /// Returns `EnvironmentCreationFailed` when every interpreter and strategy
    /// failed, or an I/O error when the cache directory cannot be created.
    pub fn build(&self, interpreters: &[PathBuf], target: &Path) -> Result<BuildOutcome> {
        info!(root = %target.display(), "creating a virtual environment");
        let cache_dir = self.paths.cache_dir(target)?;

        for python in interpreters {
            debug!(python = %python.display(), "using python for virtual environment");
            if let Some(strategy) = self.run_cascade(python, target, &cache_dir) {
                return self.finish(python, strategy, false, target);
            }
        }

        let already_portable = interpreters
            .iter()
            .any(|python| PortableRuntimeFetcher::owns(python, &cache_dir));
        if self.portable.is_available() && !already_portable {
            if let Some(python) = self.portable.fetch(&cache_dir) {
                if let Some(strategy) = self.run_cascade(&python, target, &cache_dir) {
                    return self.finish(&python, strategy, true, target);
                }
            }
        }

        if let Err(err) = remove_path(target) {
            warn!(root = %target.display(), error = %err, "could not remove partial environment");
        }
        Err(ProvisionError::EnvironmentCreationFailed {
            root: target.to_path_buf(),
        }
        .into())
    }

    fn run_cascade(&self, python: &Path, target: &Path, cache_dir: &Path) -> Option<BuildStrategy> {
        let mut state = BuildState::Empty;
        loop {
            state = match state {
                BuildState::Empty => BuildState::Attempting(0),
                BuildState::Attempting(index) => match BuildStrategy::ORDER.get(index) {
                    Some(&strategy) if self.attempt(strategy, python, target, cache_dir) => {
                        BuildState::Succeeded(strategy)
                    }
                    Some(_) => BuildState::Attempting(index + 1),
                    None => BuildState::Exhausted,
                },
                BuildState::Succeeded(strategy) => return Some(strategy),
                BuildState::Exhausted => {
                    debug!(python = %python.display(), "all build strategies failed");
                    return None;
                }
            };
        }
    }

    fn attempt(&self, strategy: BuildStrategy, python: &Path, target: &Path, cache_dir: &Path) -> bool {
        let invocations = match self.invocations(strategy, python, target, cache_dir) {
            Ok(invocations) => invocations,
            Err(err) => {
                debug!(?strategy, error = %format!("{err:#}"), "build strategy unavailable");
                return false;
            }
        };
        for invocation in invocations {
            if let Err(err) = wipe_preserving(target, &[CACHE_DIR_NAME]) {
                debug!(root = %target.display(), error = %err, "could not clear target");
                continue;
            }
            debug!(?strategy, command = %invocation.render(), "creating virtual environment");
            match self.process.run(&invocation.program, &invocation.args, None) {
                Ok(output) if output.success() => {
                    if built_interpreter(target).is_file() {
                        return true;
                    }
                    debug!(command = %invocation.render(), "builder exited cleanly without an interpreter");
                }
                Ok(output) => {
                    debug!(
                        command = %invocation.render(),
                        code = output.code,
                        output = %output.combined(),
                        "builder failed"
                    );
                }
                Err(err) => {
                    debug!(command = %invocation.render(), error = %err, "builder could not start");
                }
            }
        }
        false
    }

    fn invocations(
        &self,
        strategy: BuildStrategy,
        python: &Path,
        target: &Path,
        cache_dir: &Path,
    ) -> Result<Vec<Invocation>> {
        let target = target.to_string_lossy().into_owned();
        let interpreter = python.to_string_lossy().into_owned();
        Ok(match strategy {
            BuildStrategy::LocalModule => {
                vec![Invocation::new(python, &["-m", "venv", target.as_str()])]
            }
            BuildStrategy::LocalThirdPartyTool => {
                let mut invocations = vec![Invocation::new(
                    python,
                    &["-m", "virtualenv", "-p", interpreter.as_str(), target.as_str()],
                )];
                let standalone = self.standalone_virtualenv();
                if let Some(tool) = &standalone {
                    invocations.push(Invocation::new(tool, &["-p", interpreter.as_str(), target.as_str()]));
                }
                invocations.push(Invocation::new(python, &["-m", "virtualenv", target.as_str()]));
                if let Some(tool) = standalone {
                    invocations.push(Invocation::new(tool, &[target.as_str()]));
                }
                invocations
            }
            BuildStrategy::DownloadedBuilderScript => {
                let script = fetch_cached(
                    self.http,
                    VIRTUALENV_URL,
                    &cache_dir.join(filename_from_url(VIRTUALENV_URL)),
                )?;
                let script = script.to_string_lossy().into_owned();
                vec![Invocation::new(python, &[script.as_str(), target.as_str()])]
            }
        })
    }

    fn standalone_virtualenv(&self) -> Option<PathBuf> {
        if self.search_path.is_empty() {
            return None;
        }
        let joined = std::env::join_paths(self.search_path).ok()?;
        let cwd = std::env::current_dir().ok()?;
        which::which_in("virtualenv", Some(joined), cwd).ok()
    }

    fn finish(
        &self,
        base_python: &Path,
        strategy: BuildStrategy,
        portable: bool,
        target: &Path,
    ) -> Result<BuildOutcome> {
        let version = match interpreter_version(self.process, base_python, self.probe_timeout) {
            Ok(version) => version,
            Err(err) => {
                warn!(python = %base_python.display(), error = %err, "could not read interpreter version");
                "unknown".to_string()
            }
        };
        let state = EnvironmentState {
            created_at: OffsetDateTime::now_utc(),
            interpreter_path: base_python.display().to_string(),
            interpreter_version: version,
            installer_version: PENV_VERSION.to_string(),
            host_platform_signature: self.platform.to_string(),
            last_upgrade_check_at: None,
        };
        let store = StateStore::new(self.paths.state_file(target));
        if let Err(err) = store.write(&state) {
            if let Err(cleanup) = remove_path(target) {
                warn!(root = %target.display(), error = %cleanup, "could not remove partial environment");
            }
            return Err(err);
        }
        info!(root = %target.display(), ?strategy, "virtual environment has been successfully created");
        Ok(BuildOutcome {
            root: target.to_path_buf(),
            python: built_interpreter(target),
            base_python: base_python.to_path_buf(),
            strategy,
            portable,
            state,
        })
    }
}
