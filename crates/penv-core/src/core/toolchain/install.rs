use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::core::env::builder::EnvironmentBuilder;
use crate::core::env::pip::bootstrap_pip;
use crate::core::errors::outcome_from_error;
use crate::core::home::shutdown_helper_servers;
use crate::core::python::discovery::InterpreterDiscovery;
use crate::core::python::portable::PortableRuntimeFetcher;
use crate::{CommandContext, ExecutionOutcome, ProvisionError};

#[derive(Clone, Debug, Default)]
pub struct InstallRequest {
    /// Glob patterns (or literal paths) of interpreters to skip.
    pub ignore_python: Vec<String>,
    pub shutdown_helpers: bool,
    /// Toolchain package to install; falls back to `PENV_TOOLCHAIN`.
    pub package: Option<String>,
}

/// Provisions the isolated environment and installs the configured toolchain.
///
/// # Errors
/// Returns an error only for failures that cannot be reported as an outcome.
pub fn install(ctx: &CommandContext, request: &InstallRequest) -> Result<ExecutionOutcome> {
    match run_install(ctx, request) {
        Ok(outcome) => Ok(outcome),
        Err(err) => Ok(outcome_from_error(&err)),
    }
}

fn run_install(ctx: &CommandContext, request: &InstallRequest) -> Result<ExecutionOutcome> {
    let helpers_stopped = if request.shutdown_helpers {
        debug!("stopping local helper servers");
        Some(shutdown_helper_servers())
    } else {
        None
    };

    let root = ctx.environment_root()?;
    let err = match provision(ctx, request, &root, helpers_stopped) {
        Ok(outcome) => return Ok(outcome),
        Err(err) => err,
    };
    let Some(retry_root) = retry_root_after(ctx, &root, &err) else {
        return Err(err);
    };
    warn!(
        failed = %root.display(),
        retry = %retry_root.display(),
        error = %err,
        "profile path contains a space; retrying at the volume root"
    );
    let mut outcome = provision(ctx, request, &retry_root, helpers_stopped)?;
    if let Some(details) = outcome.details.as_object_mut() {
        details.insert("retried_from".into(), json!(root.display().to_string()));
    }
    Ok(outcome)
}

/// Builders and pip can choke on a profile path with a space in it.
fn retry_root_after(ctx: &CommandContext, root: &Path, err: &anyhow::Error) -> Option<PathBuf> {
    let retryable = matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(
            ProvisionError::EnvironmentCreationFailed { .. }
                | ProvisionError::ToolchainInstallFailed { .. }
        )
    );
    if !retryable {
        return None;
    }
    ctx.config().paths().space_free_retry_root(root)
}

fn provision(
    ctx: &CommandContext,
    request: &InstallRequest,
    root: &Path,
    helpers_stopped: Option<bool>,
) -> Result<ExecutionOutcome> {
    let config = ctx.config();
    let root = root.to_path_buf();
    let portable = PortableRuntimeFetcher::new(ctx.http(), config.platform(), config.portable_url());
    let strict = !portable.is_available();

    let discovery = InterpreterDiscovery::new(
        ctx.process(),
        config.search_path(),
        config.current_interpreter().map(PathBuf::as_path),
        config.probe().timeout,
    );
    let interpreters = discovery.find_compatible(&request.ignore_python, strict)?;
    info!(count = interpreters.len(), "compatible python interpreters found");

    let builder = EnvironmentBuilder::new(
        ctx.process(),
        ctx.http(),
        config.paths(),
        config.platform(),
        portable,
    )
    .with_search_path(config.search_path())
    .with_probe_timeout(config.probe().timeout);
    let built = builder.build(&interpreters, &root)?;

    let cache_dir = config.paths().cache_dir(&root)?;
    let pip = bootstrap_pip(ctx.process(), ctx.http(), &root, &built.python, &cache_dir);

    let package = request
        .package
        .clone()
        .or_else(|| config.toolchain().package.clone());
    let toolchain = match &package {
        Some(package) => {
            install_toolchain(ctx, &built.python, package)?;
            match config.toolchain().stem_for(Some(package.as_str())) {
                Some(stem) => Some(config.paths().executable_path(&root, stem)),
                None => {
                    warn!(package = %package, "no executable name derivable; set PENV_TOOLCHAIN_EXE");
                    None
                }
            }
        }
        None => None,
    };

    let bin_dir = config.paths().binary_dir(&root);
    Ok(ExecutionOutcome::success(
        format!("environment ready at {}", root.display()),
        json!({
            "root": root.display().to_string(),
            "bin_dir": bin_dir.display().to_string(),
            "python": built.python.display().to_string(),
            "base_python": built.base_python.display().to_string(),
            "version": built.state.interpreter_version,
            "strategy": built.strategy,
            "portable": built.portable,
            "platform": built.state.host_platform_signature,
            "pip": pip,
            "package": package,
            "toolchain": toolchain.map(|path| path.display().to_string()),
            "helpers_stopped": helpers_stopped,
        }),
    ))
}

fn install_toolchain(ctx: &CommandContext, python: &Path, package: &str) -> Result<()> {
    info!(package, "installing toolchain into the environment");
    let args = vec![
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
        "-U".to_string(),
        package.to_string(),
    ];
    // Machine-readable output must stay clean.
    let output = if ctx.global.json || ctx.global.quiet {
        ctx.process().run(python, &args, None)
    } else {
        ctx.process().run_passthrough(python, &args)
    }
    .with_context(|| format!("running pip with {}", python.display()))
    .map_err(|err| ProvisionError::ToolchainInstallFailed {
        package: package.to_string(),
        error: format!("{err:#}"),
    })?;
    if !output.success() {
        let captured = output.combined();
        let error = if captured.trim().is_empty() {
            format!("pip exited with status {}", output.code)
        } else {
            captured.trim().to_string()
        };
        return Err(ProvisionError::ToolchainInstallFailed {
            package: package.to_string(),
            error,
        }
        .into());
    }
    Ok(())
}
