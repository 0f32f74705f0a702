use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use penv_domain::{EnvironmentState, StateStore};

use crate::effects::ProcessRunner;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpgradeDecision {
    /// Last check is within the interval.
    Recent,
    /// First check after provisioning: only the timestamp is recorded.
    FirstCheckRecorded,
    /// Due, but there is no toolchain executable to upgrade.
    NoToolchain,
    Upgraded,
    Failed { error: String },
}

/// Rate-limited `<toolchain> upgrade`.
///
/// The check timestamp is persisted before the upgrade runs, so a failing
/// upgrade is not retried until the next interval.
///
/// # Errors
/// Returns an error only when the updated state cannot be written.
pub(crate) fn auto_upgrade(
    process: &dyn ProcessRunner,
    store: &StateStore,
    state: &mut EnvironmentState,
    toolchain: Option<&Path>,
    dev: bool,
    interval: Duration,
    now: OffsetDateTime,
) -> Result<UpgradeDecision> {
    let previous = state.last_upgrade_check_at;
    if previous.is_some() && !state.is_stale(interval, now) {
        debug!("upgrade check is recent; skipping");
        return Ok(UpgradeDecision::Recent);
    }
    state.record_upgrade_check(now);
    store.write(state)?;
    if previous.is_none() {
        debug!("first upgrade check recorded");
        return Ok(UpgradeDecision::FirstCheckRecorded);
    }
    let Some(exe) = toolchain else {
        return Ok(UpgradeDecision::NoToolchain);
    };
    let mut args = vec!["upgrade".to_string()];
    if dev {
        args.push("--dev".to_string());
    }
    info!(toolchain = %exe.display(), "upgrading toolchain");
    match process.run(exe, &args, None) {
        Ok(output) if output.success() => Ok(UpgradeDecision::Upgraded),
        Ok(output) => {
            let error = format!("exit status {}: {}", output.code, output.combined());
            warn!(toolchain = %exe.display(), %error, "toolchain upgrade failed");
            Ok(UpgradeDecision::Failed { error })
        }
        Err(err) => {
            warn!(toolchain = %exe.display(), error = %err, "toolchain upgrade could not start");
            Ok(UpgradeDecision::Failed {
                error: format!("{err:#}"),
            })
        }
    }
}
