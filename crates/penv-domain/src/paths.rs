use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::platform::{bin_dir_name, executable_name};

pub const ROOT_DIR_NAME: &str = ".penv";
pub const CACHE_DIR_NAME: &str = ".cache";
pub const STATE_FILENAME: &str = "state.json";

const WRITE_PROBE_FILENAME: &str = "file.tmp";

/// Explicit locations that replace the computed defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathOverrides {
    pub env_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
}

/// Computes where the isolated environment and its support files live.
///
/// The resolver holds no process-wide state: it is built from an explicit home
/// directory and the overrides captured from the environment, and every path
/// it hands out is derived from those values.
#[derive(Clone, Debug)]
pub struct PathResolver {
    home: Option<PathBuf>,
    overrides: PathOverrides,
    /// `<volume>\.penv`, only known on Windows.
    volume_root: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(home: Option<PathBuf>, overrides: PathOverrides) -> Self {
        let volume_root = home
            .as_deref()
            .filter(|_| cfg!(windows))
            .and_then(|home| volume_root_fallback(&home.join(ROOT_DIR_NAME)));
        Self {
            home,
            overrides,
            volume_root,
        }
    }

    /// Replaces the volume-level root used by the profile path fallbacks.
    #[must_use]
    pub fn with_volume_root(mut self, volume_root: PathBuf) -> Self {
        self.volume_root = Some(volume_root);
        self
    }

    /// Root directory of the isolated environment.
    ///
    /// # Errors
    /// Returns an error when no override is set and the home directory is
    /// unknown.
    pub fn environment_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.overrides.env_dir {
            return Ok(dir.clone());
        }
        let home = self
            .home
            .as_ref()
            .ok_or_else(|| anyhow!("home directory not found; set PENV_DIR"))?;
        let root = home.join(ROOT_DIR_NAME);
        if let Some(fallback) = &self.volume_root {
            // An existing volume root was adopted by an earlier install.
            if fallback.is_dir() {
                return Ok(fallback.clone());
            }
            if !is_ascii_path(&root) {
                return Ok(prefer_writable_fallback(root, fallback.clone()));
            }
        }
        Ok(root)
    }

    /// Root to retry provisioning at after a failure under `failed_root`, whose
    /// path contains a space that some builders cannot handle.
    ///
    /// Only the computed default root is ever relocated; `PENV_DIR` is kept.
    /// The volume root is created (and checked for writability) here.
    pub fn space_free_retry_root(&self, failed_root: &Path) -> Option<PathBuf> {
        if self.overrides.env_dir.is_some() || !has_space(failed_root) {
            return None;
        }
        let fallback = self.volume_root.as_ref()?;
        if has_space(fallback) || fallback == failed_root {
            return None;
        }
        if fallback.is_dir() {
            return Some(fallback.clone());
        }
        match verify_writable(fallback) {
            Ok(()) => Some(fallback.clone()),
            Err(err) => {
                debug!(fallback = %fallback.display(), error = %err, "volume root is not writable");
                None
            }
        }
    }

    pub fn binary_dir(&self, root: &Path) -> PathBuf {
        match &self.overrides.bin_dir {
            Some(dir) => dir.clone(),
            None => root.join(bin_dir_name()),
        }
    }

    /// Cache directory under `root`, created on first use.
    ///
    /// # Errors
    /// Returns an error when the directory cannot be created, typically
    /// because of missing permissions.
    pub fn cache_dir(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(CACHE_DIR_NAME);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory at {}", dir.display()))?;
        Ok(dir)
    }

    pub fn state_file(&self, root: &Path) -> PathBuf {
        root.join(STATE_FILENAME)
    }

    /// Interpreter executable inside the environment.
    pub fn interpreter_path(&self, root: &Path) -> PathBuf {
        self.executable_path(root, "python")
    }

    pub fn executable_path(&self, root: &Path, stem: &str) -> PathBuf {
        self.binary_dir(root).join(executable_name(stem))
    }
}

fn is_ascii_path(path: &Path) -> bool {
    path.to_str().is_some_and(str::is_ascii)
}

fn has_space(path: &Path) -> bool {
    path.to_string_lossy().contains(' ')
}

fn volume_root_fallback(path: &Path) -> Option<PathBuf> {
    match path.components().next()? {
        Component::Prefix(prefix) => {
            let mut root = PathBuf::from(prefix.as_os_str());
            root.push(MAIN_SEPARATOR_STR);
            root.push(ROOT_DIR_NAME);
            Some(root)
        }
        _ => None,
    }
}

/// Picks `fallback` when it already exists or can be created and written to;
/// otherwise keeps `original`.
pub(crate) fn prefer_writable_fallback(original: PathBuf, fallback: PathBuf) -> PathBuf {
    if fallback.is_dir() {
        return fallback;
    }
    match verify_writable(&fallback) {
        Ok(()) => fallback,
        Err(err) => {
            debug!(
                fallback = %fallback.display(),
                error = %err,
                "fallback root is not writable; keeping profile path"
            );
            original
        }
    }
}

fn verify_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(WRITE_PROBE_FILENAME);
    fs::write(&probe, b"test")?;
    fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn resolver_with_root(root: &Path) -> PathResolver {
        PathResolver::new(
            None,
            PathOverrides {
                env_dir: Some(root.to_path_buf()),
                bin_dir: None,
            },
        )
    }

    #[test]
    fn override_root_contains_every_derived_path() {
        let temp = tempdir().unwrap();
        let custom = temp.path().join("custom-root");
        let resolver = resolver_with_root(&custom);

        let root = resolver.environment_root().unwrap();
        assert_eq!(root, custom);
        assert!(resolver.binary_dir(&root).starts_with(&custom));
        assert!(resolver.cache_dir(&root).unwrap().starts_with(&custom));
        assert!(resolver.state_file(&root).starts_with(&custom));
        assert!(resolver.interpreter_path(&root).starts_with(&custom));
    }

    #[test]
    fn default_root_lives_under_home() {
        let resolver = PathResolver::new(
            Some(PathBuf::from("/home/someone")),
            PathOverrides::default(),
        );
        let root = resolver.environment_root().unwrap();
        assert_eq!(root, PathBuf::from("/home/someone").join(ROOT_DIR_NAME));
        assert_eq!(resolver.binary_dir(&root), root.join(bin_dir_name()));
    }

    #[test]
    fn missing_home_without_override_is_an_error() {
        let resolver = PathResolver::new(None, PathOverrides::default());
        let err = resolver.environment_root().unwrap_err();
        assert!(err.to_string().contains("PENV_DIR"), "{err}");
    }

    #[test]
    fn bin_dir_override_wins() {
        let temp = tempdir().unwrap();
        let bin = temp.path().join("elsewhere");
        let resolver = PathResolver::new(
            None,
            PathOverrides {
                env_dir: Some(temp.path().join("root")),
                bin_dir: Some(bin.clone()),
            },
        );
        let root = resolver.environment_root().unwrap();
        assert_eq!(resolver.binary_dir(&root), bin);
        assert_eq!(
            resolver.interpreter_path(&root),
            bin.join(executable_name("python"))
        );
    }

    #[test]
    fn cache_dir_is_idempotent() {
        let temp = tempdir().unwrap();
        let resolver = resolver_with_root(temp.path());
        let first = resolver.cache_dir(temp.path()).unwrap();
        let second = resolver.cache_dir(temp.path()).unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn cache_dir_fails_when_root_is_a_file() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let resolver = resolver_with_root(&blocker);
        let err = resolver.cache_dir(&blocker).unwrap_err();
        assert!(err.to_string().contains("creating cache directory"), "{err}");
    }

    #[test]
    fn writable_fallback_is_adopted_and_marker_removed() {
        let temp = tempdir().unwrap();
        let original = temp.path().join("profile");
        let fallback = temp.path().join("volume").join(ROOT_DIR_NAME);
        let chosen = prefer_writable_fallback(original, fallback.clone());
        assert_eq!(chosen, fallback);
        assert!(!fallback.join(WRITE_PROBE_FILENAME).exists());
    }

    #[test]
    fn existing_volume_root_is_adopted() {
        let temp = tempdir().unwrap();
        let volume = temp.path().join("volume").join(ROOT_DIR_NAME);
        let resolver = PathResolver::new(Some(temp.path().join("John Doe")), PathOverrides::default())
            .with_volume_root(volume.clone());
        let profile = temp.path().join("John Doe").join(ROOT_DIR_NAME);
        assert_eq!(resolver.environment_root().unwrap(), profile);

        fs::create_dir_all(&volume).unwrap();
        assert_eq!(resolver.environment_root().unwrap(), volume);
    }

    #[test]
    fn retry_root_requires_a_space_in_the_failed_profile_path() {
        let temp = tempdir().unwrap();
        let volume = temp.path().join("volume").join(ROOT_DIR_NAME);
        let spaced = temp.path().join("John Doe").join(ROOT_DIR_NAME);
        let plain = temp.path().join("jdoe").join(ROOT_DIR_NAME);
        let resolver = PathResolver::new(Some(temp.path().join("John Doe")), PathOverrides::default())
            .with_volume_root(volume.clone());

        assert_eq!(resolver.space_free_retry_root(&plain), None);
        assert!(!volume.exists());
        assert_eq!(resolver.space_free_retry_root(&spaced), Some(volume.clone()));
        assert!(volume.is_dir());
        assert!(!volume.join(WRITE_PROBE_FILENAME).exists());
    }

    #[test]
    fn retry_root_is_never_offered_for_overrides_or_spaced_volumes() {
        let temp = tempdir().unwrap();
        let spaced = temp.path().join("John Doe").join(ROOT_DIR_NAME);

        let overridden = PathResolver::new(
            None,
            PathOverrides {
                env_dir: Some(spaced.clone()),
                bin_dir: None,
            },
        )
        .with_volume_root(temp.path().join("volume").join(ROOT_DIR_NAME));
        assert_eq!(overridden.space_free_retry_root(&spaced), None);

        let spaced_volume = PathResolver::new(None, PathOverrides::default())
            .with_volume_root(temp.path().join("my volume").join(ROOT_DIR_NAME));
        assert_eq!(spaced_volume.space_free_retry_root(&spaced), None);

        let no_volume = PathResolver::new(None, PathOverrides::default());
        assert_eq!(no_volume.space_free_retry_root(&spaced), None);
    }

    #[test]
    fn unwritable_fallback_reverts_to_original() {
        let temp = tempdir().unwrap();
        let original = temp.path().join("profile");
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let chosen = prefer_writable_fallback(original.clone(), blocker.join(ROOT_DIR_NAME));
        assert_eq!(chosen, original);
    }
}
