#![deny(clippy::all)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::config::context;
pub(crate) use crate::core::runtime::{effects, process};
pub(crate) use crate::core::tooling::{diagnostics, outcome};

pub use crate::core::config::context::{CommandContext, CommandInfo};
pub use crate::core::config::{Config, GlobalOptions, ProbeConfig, ToolchainConfig};
pub use crate::core::errors::ProvisionError;
pub use crate::core::runtime::effects::{
    Effects, HttpClient, ProcessRunner, SharedEffects, SystemEffects,
};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::runtime::{format_status_message, to_json_response, CommandGroup};
pub use crate::core::tooling::diagnostics::commands as diag_commands;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome};

pub use crate::core::env::{BuildOutcome, BuildStrategy, EnvironmentBuilder};
pub use crate::core::python::{
    probe, CompatibilityReport, InterpreterDiscovery, PortableRuntimeFetcher, VerdictKind,
};
pub use crate::core::toolchain::{
    check_env, check_python, install, CheckEnvRequest, CheckPythonRequest, EnvironmentReport,
    InstallRequest, UpgradeDecision,
};
