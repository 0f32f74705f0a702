use std::sync::Arc;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use penv_core::{
    CommandContext, CommandInfo, CommandStatus, ExecutionOutcome, GlobalOptions, SharedEffects,
    SystemEffects,
};
use serde_json::Value;

mod cli;
mod dispatch;
mod style;

use cli::PenvCli;
use style::Style;

/// Detail keys echoed under the status line, in display order.
const SUMMARY_KEYS: &[&str] = &[
    "root",
    "python",
    "version",
    "python_version",
    "strategy",
    "toolchain",
    "toolchain_version",
    "dump_state",
];

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PenvCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        python: cli.python.clone(),
    };

    let effects: SharedEffects = Arc::new(SystemEffects::new());
    let ctx = CommandContext::new(&global, effects).map_err(|err| eyre!("{err:?}"))?;
    let (info, outcome) = dispatch::dispatch_command(&ctx, &cli.command)?;
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("penv={level},penv_core={level},penv_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &PenvCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    if cli.json {
        let payload = penv_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    let message = penv_core::format_status_message(info, &outcome.message);
    if cli.quiet {
        if code != 0 {
            eprintln!("{message}");
        }
        return Ok(code);
    }

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
    println!("{}", style.status(&outcome.status, &message));
    if outcome.status == CommandStatus::Ok {
        for (key, value) in summary_lines(&outcome.details) {
            println!("{}", style.detail(key, &value));
        }
    }
    if let Some(hint) = hint_from_details(&outcome.details) {
        println!("{}", style.info(&format!("Hint: {hint}")));
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn summary_lines(details: &Value) -> Vec<(&'static str, String)> {
    let Some(map) = details.as_object() else {
        return Vec::new();
    };
    SUMMARY_KEYS
        .iter()
        .filter_map(|key| {
            let value = match map.get(*key)? {
                Value::String(text) => text.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((*key, value))
        })
        .collect()
}
