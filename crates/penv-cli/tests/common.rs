#![allow(dead_code)]

use std::fs;
use std::path::Path;

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use penv_domain::{bin_dir_name, executable_name, EnvironmentState, StateStore};
use serde_json::Value;
use time::OffsetDateTime;

const SCRUBBED_VARS: &[&str] = &[
    "PENV_BIN_DIR",
    "PENV_TOOLCHAIN",
    "PENV_TOOLCHAIN_EXE",
    "PENV_PORTABLE_PYTHON_URL",
    "PENV_PROBE_TIMEOUT",
    "PYTHONEXEPATH",
];

/// `penv` pointed at `root`, isolated from the caller's configuration.
pub fn penv(root: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("penv");
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("PENV_DIR", root).env("NO_COLOR", "1");
    cmd
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn state_for(platform: &str) -> EnvironmentState {
    EnvironmentState {
        created_at: OffsetDateTime::now_utc(),
        interpreter_path: "/usr/bin/python3".to_string(),
        interpreter_version: "3.11.4".to_string(),
        installer_version: "0.1.0".to_string(),
        host_platform_signature: platform.to_string(),
        last_upgrade_check_at: None,
    }
}

/// Lays out a provisioned root: interpreter placeholder plus `state.json`.
pub fn provision(root: &Path, state: &EnvironmentState) {
    let bin = root.join(bin_dir_name());
    fs::create_dir_all(&bin).expect("create bin dir");
    fs::write(bin.join(executable_name("python")), b"").expect("write interpreter");
    StateStore::new(root.join("state.json"))
        .write(state)
        .expect("write state");
}
