//! `state.json` persistence and staleness rules.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Minimum time between two automatic upgrade checks.
pub const UPGRADE_CHECK_INTERVAL: Duration = Duration::days(3);

/// Metadata recorded when an environment is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentState {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub interpreter_path: String,
    pub interpreter_version: String,
    pub installer_version: String,
    pub host_platform_signature: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_upgrade_check_at: Option<OffsetDateTime>,
}

impl EnvironmentState {
    /// Whether an automatic upgrade is due.
    ///
    /// An environment that was never checked is not stale: the first check
    /// after provisioning only records its timestamp.
    pub fn is_stale(&self, interval: Duration, now: OffsetDateTime) -> bool {
        match self.last_upgrade_check_at {
            Some(last) => now - last >= interval,
            None => false,
        }
    }

    pub fn record_upgrade_check(&mut self, now: OffsetDateTime) {
        self.last_upgrade_check_at = Some(now);
    }
}

/// Reads and writes [`EnvironmentState`] at a fixed location.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `state`, replacing any previous file atomically.
    ///
    /// # Errors
    /// Returns an error when the file cannot be serialized or written.
    pub fn write(&self, state: &EnvironmentState) -> Result<()> {
        let mut contents = serde_json::to_vec_pretty(state)?;
        contents.push(b'\n');
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &contents)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    /// Loads the recorded state; a missing or unparsable file yields `None`.
    pub fn read(&self) -> Option<EnvironmentState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "environment state unavailable");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "environment state is not parsable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn sample_state() -> EnvironmentState {
        EnvironmentState {
            created_at: datetime!(2024-03-01 12:00:00 UTC),
            interpreter_path: "/usr/bin/python3".to_string(),
            interpreter_version: "3.11.4".to_string(),
            installer_version: "0.1.0".to_string(),
            host_platform_signature: "linux_x86_64".to_string(),
            last_upgrade_check_at: None,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        let mut state = sample_state();
        store.write(&state).unwrap();
        assert_eq!(store.read(), Some(state.clone()));

        state.record_upgrade_check(datetime!(2024-03-05 08:30:00 UTC));
        store.write(&state).unwrap();
        assert_eq!(store.read(), Some(state));
    }

    #[test]
    fn write_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("nested/env/state.json"));
        store.write(&sample_state()).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.ends_with('\n'));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn absent_last_check_is_not_serialized() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        store.write(&sample_state()).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("last_upgrade_check_at"), "{raw}");
        assert!(raw.contains("\"host_platform_signature\": \"linux_x86_64\""));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("state.json"));
        assert_eq!(store.read(), None);
    }

    #[test]
    fn garbage_reads_as_none() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "not-json").unwrap();
        assert_eq!(StateStore::new(&path).read(), None);

        fs::write(&path, r#"{"created_at": "yesterday"}"#).unwrap();
        assert_eq!(StateStore::new(&path).read(), None);
    }

    #[test]
    fn never_checked_state_is_not_stale() {
        let state = sample_state();
        let far_future = datetime!(2030-01-01 00:00:00 UTC);
        assert!(!state.is_stale(UPGRADE_CHECK_INTERVAL, far_future));
    }

    #[test]
    fn staleness_follows_interval() {
        let mut state = sample_state();
        state.record_upgrade_check(datetime!(2024-03-01 12:00:00 UTC));
        assert!(!state.is_stale(UPGRADE_CHECK_INTERVAL, datetime!(2024-03-02 12:00:00 UTC)));
        assert!(state.is_stale(UPGRADE_CHECK_INTERVAL, datetime!(2024-03-04 12:00:00 UTC)));
        assert!(state.is_stale(UPGRADE_CHECK_INTERVAL, datetime!(2024-04-01 00:00:00 UTC)));
    }
}
