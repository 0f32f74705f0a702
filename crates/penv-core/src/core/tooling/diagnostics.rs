pub mod commands {
    pub const INSTALL: &str = "PE100";
    pub const CHECK_PYTHON: &str = "PE200";
    pub const CHECK_ENV: &str = "PE210";
    pub const GENERIC: &str = "PE000";
}

/// Codes carried by [`crate::ProvisionError`].
pub mod provision {
    pub const INCOMPATIBLE_RUNTIME: &str = "PE300";
    pub const NO_COMPATIBLE_RUNTIME: &str = "PE301";
    pub const MISSING_VENV_MODULE: &str = "PE302";
    pub const ENVIRONMENT_CREATION_FAILED: &str = "PE400";
    pub const STATE_UNAVAILABLE: &str = "PE410";
    pub const PLATFORM_MISMATCH: &str = "PE411";
    pub const TOOLCHAIN_INSTALL_FAILED: &str = "PE500";
    pub const TOOLCHAIN_INVALID: &str = "PE501";
    pub const TOOLCHAIN_VERSION_MISMATCH: &str = "PE502";
}
