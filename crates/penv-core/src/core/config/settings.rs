use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use penv_domain::{PathOverrides, PathResolver, PlatformSignature};

pub(crate) const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub python: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Non-empty value of `key`.
    pub(crate) fn non_empty(&self, key: &str) -> Option<&str> {
        self.var(key).map(str::trim).filter(|value| !value.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug)]
pub struct Config {
    pub(crate) paths: PathResolver,
    pub(crate) platform: PlatformSignature,
    pub(crate) search_path: Vec<PathBuf>,
    pub(crate) current_interpreter: Option<PathBuf>,
    pub(crate) probe: ProbeConfig,
    pub(crate) portable_url: Option<String>,
    pub(crate) toolchain: ToolchainConfig,
}

impl Config {
    pub(crate) fn from_snapshot(
        snapshot: &EnvSnapshot,
        global: &GlobalOptions,
        home: Option<PathBuf>,
    ) -> Self {
        let overrides = PathOverrides {
            env_dir: snapshot.non_empty("PENV_DIR").map(PathBuf::from),
            bin_dir: snapshot.non_empty("PENV_BIN_DIR").map(PathBuf::from),
        };
        let search_path = snapshot
            .var("PATH")
            .map(|raw| env::split_paths(raw).filter(|dir| !dir.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        let current_interpreter = global
            .python
            .clone()
            .or_else(|| snapshot.non_empty("PYTHONEXEPATH").map(PathBuf::from));
        Self {
            paths: PathResolver::new(home, overrides),
            platform: PlatformSignature::current(),
            search_path,
            current_interpreter,
            probe: ProbeConfig {
                timeout: parse_timeout(snapshot.var("PENV_PROBE_TIMEOUT")),
            },
            portable_url: snapshot.non_empty("PENV_PORTABLE_PYTHON_URL").map(ToOwned::to_owned),
            toolchain: ToolchainConfig {
                package: snapshot.non_empty("PENV_TOOLCHAIN").map(ToOwned::to_owned),
                executable: snapshot.non_empty("PENV_TOOLCHAIN_EXE").map(ToOwned::to_owned),
            },
        }
    }

    #[must_use]
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    #[must_use]
    pub fn platform(&self) -> &PlatformSignature {
        &self.platform
    }

    #[must_use]
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    #[must_use]
    pub fn current_interpreter(&self) -> Option<&PathBuf> {
        self.current_interpreter.as_ref()
    }

    #[must_use]
    pub fn probe(&self) -> &ProbeConfig {
        &self.probe
    }

    #[must_use]
    pub fn portable_url(&self) -> Option<&str> {
        self.portable_url.as_deref()
    }

    #[must_use]
    pub fn toolchain(&self) -> &ToolchainConfig {
        &self.toolchain
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ToolchainConfig {
    /// Package installed into the environment after provisioning.
    pub package: Option<String>,
    /// Executable stem used for `upgrade`; defaults to the distribution name
    /// of `package`.
    pub executable: Option<String>,
}

impl ToolchainConfig {
    #[must_use]
    pub fn executable_stem(&self) -> Option<&str> {
        self.stem_for(self.package.as_deref())
    }

    /// Executable stem for `requirement`, which may differ from the configured
    /// package (e.g. `install --package`). URL and path requirements have no
    /// derivable name and need `PENV_TOOLCHAIN_EXE`.
    #[must_use]
    pub fn stem_for<'a>(&'a self, requirement: Option<&'a str>) -> Option<&'a str> {
        self.executable
            .as_deref()
            .or_else(|| requirement.and_then(distribution_name))
    }
}

const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".whl", ".tar.gz", ".tgz", ".tar.bz2"];

/// Distribution name of a pip requirement string: `name[extras] >= 1.0 ; marker`
/// yields `name`. Returns `None` for URLs, paths and archives.
pub(crate) fn distribution_name(requirement: &str) -> Option<&str> {
    let requirement = requirement.trim();
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    let (name, rest) = requirement.split_at(end);
    let rest = rest.trim_start();
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        return None;
    }
    // `name @ url` names the distribution explicitly.
    if !rest.starts_with('@') && (rest.starts_with(['/', '\\', ':']) || rest.contains("://")) {
        return None;
    }
    let lowered = name.to_ascii_lowercase();
    if ARCHIVE_SUFFIXES.iter().any(|suffix| lowered.ends_with(suffix)) {
        return None;
    }
    Some(name)
}

fn parse_timeout(raw: Option<&str>) -> Duration {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_PROBE_TIMEOUT;
    };
    match raw.parse::<f64>().map(Duration::try_from_secs_f64) {
        Ok(Ok(timeout)) if !timeout.is_zero() => timeout,
        _ => {
            warn!(value = raw, "ignoring invalid PENV_PROBE_TIMEOUT");
            DEFAULT_PROBE_TIMEOUT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        Config::from_snapshot(
            &EnvSnapshot::testing(pairs),
            &GlobalOptions::default(),
            Some(PathBuf::from("/home/someone")),
        )
    }

    #[test]
    fn env_dir_override_is_honored() {
        let config = config(&[("PENV_DIR", "/tmp/custom-root")]);
        let root = config.paths().environment_root().unwrap();
        assert_eq!(root, PathBuf::from("/tmp/custom-root"));
        assert!(config.paths().state_file(&root).starts_with("/tmp/custom-root"));
        assert!(config.paths().binary_dir(&root).starts_with("/tmp/custom-root"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let config = config(&[("PENV_DIR", "  "), ("PENV_TOOLCHAIN", "")]);
        let root = config.paths().environment_root().unwrap();
        assert!(root.starts_with("/home/someone"));
        assert!(config.toolchain().package.is_none());
    }

    #[test]
    fn probe_timeout_parses_seconds_and_falls_back() {
        assert_eq!(config(&[]).probe().timeout, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(
            config(&[("PENV_PROBE_TIMEOUT", "2.5")]).probe().timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(
            config(&[("PENV_PROBE_TIMEOUT", "soon")]).probe().timeout,
            DEFAULT_PROBE_TIMEOUT
        );
        assert_eq!(
            config(&[("PENV_PROBE_TIMEOUT", "-1")]).probe().timeout,
            DEFAULT_PROBE_TIMEOUT
        );
        for out_of_range in ["1e20", "inf", "NaN", "0"] {
            assert_eq!(
                config(&[("PENV_PROBE_TIMEOUT", out_of_range)]).probe().timeout,
                DEFAULT_PROBE_TIMEOUT,
                "{out_of_range}"
            );
        }
    }

    #[test]
    fn python_flag_wins_over_environment() {
        let snapshot = EnvSnapshot::testing(&[("PYTHONEXEPATH", "/usr/bin/python3")]);
        let from_env = Config::from_snapshot(&snapshot, &GlobalOptions::default(), None);
        assert_eq!(
            from_env.current_interpreter(),
            Some(&PathBuf::from("/usr/bin/python3"))
        );

        let global = GlobalOptions {
            python: Some(PathBuf::from("/opt/python/bin/python3")),
            ..GlobalOptions::default()
        };
        let from_flag = Config::from_snapshot(&snapshot, &global, None);
        assert_eq!(
            from_flag.current_interpreter(),
            Some(&PathBuf::from("/opt/python/bin/python3"))
        );
    }

    #[test]
    fn toolchain_executable_defaults_to_package() {
        let package_only = config(&[("PENV_TOOLCHAIN", "platformio")]);
        assert_eq!(package_only.toolchain().executable_stem(), Some("platformio"));

        let explicit = config(&[("PENV_TOOLCHAIN", "platformio"), ("PENV_TOOLCHAIN_EXE", "pio")]);
        assert_eq!(explicit.toolchain().executable_stem(), Some("pio"));
    }

    #[test]
    fn toolchain_stem_strips_requirement_syntax() {
        let pinned = config(&[("PENV_TOOLCHAIN", "platformio>=6.1")]);
        assert_eq!(pinned.toolchain().executable_stem(), Some("platformio"));

        for (requirement, expected) in [
            ("platformio==6.1.11", Some("platformio")),
            ("platformio[extra] ~= 6.1", Some("platformio")),
            ("platformio; python_version >= '3.7'", Some("platformio")),
            ("platformio @ https://example.com/platformio.zip", Some("platformio")),
            ("zope.interface", Some("zope.interface")),
            ("https://github.com/platformio/platformio/archive/develop.zip", None),
            ("git+https://github.com/platformio/platformio", None),
            ("./vendor/platformio", None),
            ("C:\\pkgs\\platformio", None),
            ("platformio-6.1.11.tar.gz", None),
            ("platformio-6.1.11-py3-none-any.whl", None),
            (">=6.1", None),
        ] {
            assert_eq!(distribution_name(requirement), expected, "{requirement}");
        }
    }

    #[test]
    fn url_toolchain_needs_explicit_executable() {
        let url = "https://github.com/platformio/platformio/archive/develop.zip";
        assert_eq!(config(&[("PENV_TOOLCHAIN", url)]).toolchain().executable_stem(), None);

        let named = config(&[("PENV_TOOLCHAIN", url), ("PENV_TOOLCHAIN_EXE", "platformio")]);
        assert_eq!(named.toolchain().executable_stem(), Some("platformio"));
        assert_eq!(
            named.toolchain().stem_for(Some("other>=1")),
            Some("platformio")
        );
    }

    #[cfg(unix)]
    #[test]
    fn search_path_splits_entries_and_drops_empty_ones() {
        let config = config(&[("PATH", "/usr/local/bin::/usr/bin")]);
        assert_eq!(
            config.search_path(),
            &[PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")]
        );
    }
}
