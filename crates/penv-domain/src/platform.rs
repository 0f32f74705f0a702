use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

/// OS family and CPU architecture of a host, rendered as `<os>_<arch>`
/// (`linux_x86_64`, `darwin_arm64`, `windows_amd64`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformSignature(String);

impl PlatformSignature {
    /// Signature of the host this process runs on.
    pub fn current() -> Self {
        Self::from_parts(env::consts::OS, env::consts::ARCH)
    }

    pub fn from_parts(os: &str, arch: &str) -> Self {
        let os_name = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch_name = match (os, arch) {
            ("windows", "x86_64") => "amd64",
            ("windows", "x86") => "x86",
            ("macos", "aarch64") => "arm64",
            (_, "x86") => "i686",
            (_, other) => other,
        };
        Self(format!("{os_name}_{arch_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_windows(&self) -> bool {
        self.0.starts_with("windows_")
    }
}

impl fmt::Display for PlatformSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformSignature {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Name of the directory holding executables inside an isolated environment.
pub fn bin_dir_name() -> &'static str {
    if cfg!(windows) {
        "Scripts"
    } else {
        "bin"
    }
}

/// Appends the OS executable suffix to `stem`.
pub fn executable_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}
