use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const PENV_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nCommands:\n{subcommands}\n\nGlobal options:\n{options}\n";

pub const PENV_BEFORE_HELP: &str = concat!(
    "penv ",
    env!("CARGO_PKG_VERSION"),
    " – isolated Python environment provisioning\n\n",
    "  install          Find a compatible interpreter and build the environment.\n",
    "  check python     Run the compatibility check against one interpreter.\n",
    "  check env        Re-validate the environment and run the periodic upgrade.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = PENV_BEFORE_HELP,
    help_template = PENV_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PenvCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Interpreter to try first (overrides PYTHONEXEPATH)",
        global = true
    )]
    pub python: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Provision the isolated environment and install the configured toolchain.",
        override_usage = "penv install [--ignore-python PATTERN]... [--package NAME]"
    )]
    Install(InstallArgs),
    #[command(subcommand, about = "Validate interpreters and the provisioned environment.")]
    Check(CheckCommand),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[arg(
        long = "ignore-python",
        value_name = "PATTERN",
        help = "Skip interpreters matching this glob or path (repeatable)"
    )]
    pub ignore_python: Vec<String>,
    #[arg(long, help = "Do not ping local helper servers before provisioning")]
    pub no_shutdown_helpers: bool,
    #[arg(long, value_name = "NAME", help = "Toolchain package to install (overrides PENV_TOOLCHAIN)")]
    pub package: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    #[command(about = "Run the compatibility check against one interpreter.")]
    Python(CheckPythonArgs),
    #[command(about = "Re-validate the environment; optionally run the periodic upgrade.")]
    Env(CheckEnvArgs),
}

#[derive(Args, Debug)]
pub struct CheckPythonArgs {
    #[arg(
        value_name = "PYTHON",
        help = "Interpreter path or name (defaults to --python, PYTHONEXEPATH, then PATH)"
    )]
    pub target: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckEnvArgs {
    #[arg(long, help = "Skip the periodic toolchain upgrade")]
    pub no_auto_upgrade: bool,
    #[arg(long, help = "Upgrade the toolchain to its development version")]
    pub dev: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Write the environment report as JSON to PATH (a directory gets penv-state.json)"
    )]
    pub dump_state: Option<PathBuf>,
    #[arg(
        long,
        value_name = "SPEC",
        help = "Fail unless the toolchain version satisfies SPEC (e.g. '>=6.1,<7')"
    )]
    pub version_spec: Option<String>,
}
