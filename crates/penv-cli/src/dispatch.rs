use color_eyre::Result;
use penv_core::{
    check_env, check_python, diag_commands, install, CheckEnvRequest, CheckPythonRequest,
    CommandContext, CommandGroup, CommandInfo, ExecutionOutcome, InstallRequest,
};

use crate::cli::{CheckCommand, CommandGroupCli};

pub fn command_info(group: &CommandGroupCli) -> CommandInfo {
    match group {
        CommandGroupCli::Install(_) => CommandInfo::new(CommandGroup::Install, "install"),
        CommandGroupCli::Check(CheckCommand::Python(_)) => {
            CommandInfo::new(CommandGroup::Check, "python")
        }
        CommandGroupCli::Check(CheckCommand::Env(_)) => CommandInfo::new(CommandGroup::Check, "env"),
    }
}

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let info = command_info(group);
    match group {
        CommandGroupCli::Install(args) => {
            let request = InstallRequest {
                ignore_python: args.ignore_python.clone(),
                shutdown_helpers: !args.no_shutdown_helpers,
                package: args.package.clone(),
            };
            core_call(info, || install(ctx, &request))
        }
        CommandGroupCli::Check(CheckCommand::Python(args)) => {
            let request = CheckPythonRequest {
                python: args.target.clone(),
            };
            core_call(info, || check_python(ctx, &request))
        }
        CommandGroupCli::Check(CheckCommand::Env(args)) => {
            let request = CheckEnvRequest {
                auto_upgrade: !args.no_auto_upgrade,
                dev: args.dev,
                dump_state: args.dump_state.clone(),
                version_spec: args.version_spec.clone(),
            };
            core_call(info, || check_env(ctx, &request))
        }
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => {
            if let Some(provision) = err.downcast_ref::<penv_core::ProvisionError>() {
                return Ok((info, provision.to_outcome()));
            }
            let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
            Ok((
                info,
                ExecutionOutcome::failure(
                    err.to_string(),
                    serde_json::json!({
                        "reason": "internal_error",
                        "code": failure_code(info),
                        "error": err.to_string(),
                        "issues": issues,
                    }),
                ),
            ))
        }
    }
}

fn failure_code(info: CommandInfo) -> &'static str {
    match (info.group, info.name) {
        (CommandGroup::Install, _) => diag_commands::INSTALL,
        (CommandGroup::Check, "python") => diag_commands::CHECK_PYTHON,
        (CommandGroup::Check, "env") => diag_commands::CHECK_ENV,
        _ => diag_commands::GENERIC,
    }
}
