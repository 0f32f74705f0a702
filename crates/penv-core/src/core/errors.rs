use std::path::PathBuf;

use serde_json::{json, Value};

use crate::diagnostics::provision as codes;
use crate::outcome::ExecutionOutcome;

const PYTHON_DOWNLOAD_URL: &str = "https://www.python.org/downloads/";
const MANUAL_VENV_HINT: &str =
    "Create the environment manually with `python3 -m venv <PENV_DIR>` and rerun `penv check env`.";

/// Fatal provisioning failures surfaced to the user.
///
/// Per-candidate and per-strategy failures never become a `ProvisionError`;
/// they are logged and the cascade moves on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("[PE300] {path} is not a compatible Python interpreter: {reason}")]
    IncompatibleRuntime { path: PathBuf, reason: String },
    #[error("[PE301] could not find a compatible Python 3.6 or above in your system")]
    NoCompatibleRuntime { checked: Vec<PathBuf> },
    #[error("[PE302] the Python installation at {path} is missing the `venv` module")]
    MissingVenvModule { path: PathBuf },
    #[error("[PE400] could not create the isolated environment at {root}")]
    EnvironmentCreationFailed { root: PathBuf },
    #[error("[PE410] no provisioned environment found at {root}")]
    StateUnavailable { root: PathBuf },
    #[error(
        "[PE411] environment was provisioned on platform `{recorded}`; current platform is `{live}`"
    )]
    PlatformMismatch { recorded: String, live: String },
    #[error("[PE500] could not install `{package}`: {error}")]
    ToolchainInstallFailed { package: String, error: String },
    #[error("[PE501] toolchain at {path} is not usable: {reason}")]
    ToolchainInvalid { path: PathBuf, reason: String },
    #[error("[PE502] toolchain version {version} does not match version requirements `{spec}`")]
    ToolchainVersionMismatch { version: String, spec: String },
}

impl ProvisionError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::IncompatibleRuntime { .. } => codes::INCOMPATIBLE_RUNTIME,
            Self::NoCompatibleRuntime { .. } => codes::NO_COMPATIBLE_RUNTIME,
            Self::MissingVenvModule { .. } => codes::MISSING_VENV_MODULE,
            Self::EnvironmentCreationFailed { .. } => codes::ENVIRONMENT_CREATION_FAILED,
            Self::StateUnavailable { .. } => codes::STATE_UNAVAILABLE,
            Self::PlatformMismatch { .. } => codes::PLATFORM_MISMATCH,
            Self::ToolchainInstallFailed { .. } => codes::TOOLCHAIN_INSTALL_FAILED,
            Self::ToolchainInvalid { .. } => codes::TOOLCHAIN_INVALID,
            Self::ToolchainVersionMismatch { .. } => codes::TOOLCHAIN_VERSION_MISMATCH,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::IncompatibleRuntime { .. } => "incompatible_runtime",
            Self::NoCompatibleRuntime { .. } => "no_compatible_runtime",
            Self::MissingVenvModule { .. } => "missing_venv_module",
            Self::EnvironmentCreationFailed { .. } => "environment_creation_failed",
            Self::StateUnavailable { .. } => "state_unavailable",
            Self::PlatformMismatch { .. } => "platform_mismatch",
            Self::ToolchainInstallFailed { .. } => "toolchain_install_failed",
            Self::ToolchainInvalid { .. } => "toolchain_invalid",
            Self::ToolchainVersionMismatch { .. } => "toolchain_version_mismatch",
        }
    }

    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::IncompatibleRuntime { .. } => Some(
                "Pick another interpreter with --python or install the latest official Python 3."
                    .to_string(),
            ),
            Self::NoCompatibleRuntime { .. } => Some(format!(
                "Install the latest official Python 3 and restart the installation: {PYTHON_DOWNLOAD_URL}"
            )),
            Self::MissingVenvModule { .. } => Some(
                "Install the `venv` package with the OS package manager, for example \
                 `apt-get install python3-venv` (may require `sudo`)."
                    .to_string(),
            ),
            Self::EnvironmentCreationFailed { .. } => Some(MANUAL_VENV_HINT.to_string()),
            Self::StateUnavailable { .. } => Some("Run `penv install` first.".to_string()),
            Self::PlatformMismatch { .. } => Some(
                "Remove the environment directory and run `penv install` on this machine."
                    .to_string(),
            ),
            Self::ToolchainInstallFailed { .. } if cfg!(windows) => Some(
                "If you have antivirus, firewall or defender software running, try disabling it \
                 for a while and rerun `penv install`."
                    .to_string(),
            ),
            Self::ToolchainInstallFailed { .. } => {
                Some("Check network access to the package index and rerun `penv install`.".to_string())
            }
            Self::ToolchainInvalid { .. } => Some("Run `penv install` to repair the environment.".to_string()),
            Self::ToolchainVersionMismatch { .. } => Some(
                "Run `penv install --package '<name><requirement>'` to install a matching version."
                    .to_string(),
            ),
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = json!({
            "code": self.code(),
            "reason": self.reason(),
        });
        if let Value::Object(map) = &mut details {
            if let Some(hint) = self.hint() {
                map.insert("hint".into(), json!(hint));
            }
            match self {
                Self::IncompatibleRuntime { path, reason } => {
                    map.insert("python".into(), json!(path.display().to_string()));
                    map.insert("error".into(), json!(reason));
                }
                Self::NoCompatibleRuntime { checked } => {
                    let checked: Vec<String> =
                        checked.iter().map(|path| path.display().to_string()).collect();
                    map.insert("checked".into(), json!(checked));
                }
                Self::MissingVenvModule { path } => {
                    map.insert("python".into(), json!(path.display().to_string()));
                }
                Self::EnvironmentCreationFailed { root } | Self::StateUnavailable { root } => {
                    map.insert("root".into(), json!(root.display().to_string()));
                }
                Self::PlatformMismatch { recorded, live } => {
                    map.insert("recorded".into(), json!(recorded));
                    map.insert("live".into(), json!(live));
                }
                Self::ToolchainInstallFailed { package, error } => {
                    map.insert("package".into(), json!(package));
                    map.insert("error".into(), json!(error));
                }
                Self::ToolchainInvalid { path, reason } => {
                    map.insert("path".into(), json!(path.display().to_string()));
                    map.insert("error".into(), json!(reason));
                }
                Self::ToolchainVersionMismatch { version, spec } => {
                    map.insert("version".into(), json!(version));
                    map.insert("version_spec".into(), json!(spec));
                }
            }
        }
        details
    }

    /// User-facing outcome for this failure.
    #[must_use]
    pub fn to_outcome(&self) -> ExecutionOutcome {
        ExecutionOutcome::user_error(self.to_string(), self.details())
    }
}

/// Maps an error chain to an outcome: provisioning failures become user
/// errors, anything else is a plain failure.
pub(crate) fn outcome_from_error(err: &anyhow::Error) -> ExecutionOutcome {
    if let Some(provision) = err.chain().find_map(|cause| cause.downcast_ref::<ProvisionError>()) {
        return provision.to_outcome();
    }
    let issues: Vec<String> = err.chain().map(ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "error": err.to_string(),
            "issues": issues,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CommandStatus;
    use anyhow::Context;

    #[test]
    fn messages_carry_stable_codes() {
        let err = ProvisionError::PlatformMismatch {
            recorded: "linux_x86_64".to_string(),
            live: "darwin_x86_64".to_string(),
        };
        assert!(err.to_string().starts_with("[PE411]"));
        assert_eq!(err.code(), "PE411");
        let details = err.details();
        assert_eq!(details["recorded"], "linux_x86_64");
        assert_eq!(details["live"], "darwin_x86_64");
        assert!(details["hint"].as_str().is_some());
    }

    #[test]
    fn missing_venv_hint_names_the_os_package() {
        let err = ProvisionError::MissingVenvModule {
            path: PathBuf::from("/usr/bin/python3"),
        };
        assert!(err.hint().unwrap().contains("python3-venv"));
    }

    #[test]
    fn wrapped_provision_errors_become_user_errors() {
        let err = anyhow::Error::new(ProvisionError::StateUnavailable {
            root: PathBuf::from("/tmp/env"),
        })
        .context("checking environment");
        let outcome = outcome_from_error(&err);
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["code"], "PE410");
    }

    #[test]
    fn plumbing_errors_become_failures() {
        let err: anyhow::Result<()> =
            Err(std::io::Error::other("disk full")).context("writing state");
        let outcome = outcome_from_error(&err.unwrap_err());
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["issues"][1], "disk full");
    }
}
