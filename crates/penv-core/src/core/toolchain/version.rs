use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use tracing::warn;

use crate::ProvisionError;

/// Version reported by `<toolchain> --version`, e.g. `Tool Core, version 6.1.11`.
///
/// The last dotted token that parses as a PEP 440 version wins.
pub(crate) fn reported_version(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .rev()
        .map(|token| token.trim_matches(|c: char| matches!(c, ',' | '(' | ')' | '"' | '\'')))
        .map(|token| token.strip_prefix('v').unwrap_or(token))
        .filter(|token| token.starts_with(|c: char| c.is_ascii_digit()) && token.contains('.'))
        .find_map(|token| Version::from_str(token).ok())
}

pub(crate) fn is_prerelease(version: &Version) -> bool {
    version.any_prerelease()
}

/// Checks `version` against `spec` (`>=6.1,<7`).
///
/// A spec that does not parse is reported and ignored.
///
/// # Errors
/// Returns `ToolchainVersionMismatch` when the version is unknown or outside
/// the requirement.
pub(crate) fn check_version_spec(version: Option<&Version>, spec: &str) -> Result<(), ProvisionError> {
    let specifiers = match VersionSpecifiers::from_str(spec) {
        Ok(specifiers) => specifiers,
        Err(err) => {
            warn!(spec, error = %err, "invalid version requirements; skipping the version check");
            return Ok(());
        }
    };
    match version {
        Some(version) if specifiers.contains(version) => Ok(()),
        _ => Err(ProvisionError::ToolchainVersionMismatch {
            version: version.map_or_else(|| "unknown".to_string(), ToString::to_string),
            spec: spec.to_string(),
        }),
    }
}
