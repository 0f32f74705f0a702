use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::core::net::{fetch_cached, filename_from_url};
use crate::effects::{HttpClient, ProcessRunner};

pub(crate) const GET_PIP_URL: &str = "https://bootstrap.pypa.io/get-pip.py";
pub(crate) const PIP_CONF_FILENAME: &str = "pip.conf";
const PIP_CONF: &str = "[global]\nuser=no";

/// Installs or refreshes pip inside a freshly built environment.
///
/// Best effort: returns whether pip was updated and only logs failures.
pub(crate) fn bootstrap_pip(
    process: &dyn ProcessRunner,
    http: &dyn HttpClient,
    root: &Path,
    python: &Path,
    cache_dir: &Path,
) -> bool {
    info!("updating the Python package manager in the virtual environment");
    match try_bootstrap(process, http, root, python, cache_dir) {
        Ok(()) => {
            info!("pip has been successfully updated");
            true
        }
        Err(err) => {
            debug!(error = %format!("{err:#}"), "could not install pip");
            false
        }
    }
}

fn try_bootstrap(
    process: &dyn ProcessRunner,
    http: &dyn HttpClient,
    root: &Path,
    python: &Path,
    cache_dir: &Path,
) -> Result<()> {
    let conf = root.join(PIP_CONF_FILENAME);
    debug!(path = %conf.display(), "writing pip configuration");
    fs::write(&conf, PIP_CONF).with_context(|| format!("writing {}", conf.display()))?;

    let script = fetch_cached(http, GET_PIP_URL, &cache_dir.join(filename_from_url(GET_PIP_URL)))?;
    let output = process.run(python, &[script.to_string_lossy().into_owned()], None)?;
    if !output.success() {
        bail!("get-pip.py exited with {}: {}", output.code, output.combined());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{exit, ok, FakeHttp, FakeProcess};
    use tempfile::tempdir;

    #[test]
    fn writes_conf_and_runs_get_pip() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join(".cache");
        let python = temp.path().join("bin/python");
        let http = FakeHttp::new().with_body(GET_PIP_URL, b"print('pip')");
        let process = FakeProcess::new(|_, _| ok("Successfully installed pip"));

        assert!(bootstrap_pip(&process, &http, temp.path(), &python, &cache));
        assert_eq!(
            fs::read_to_string(temp.path().join(PIP_CONF_FILENAME)).unwrap(),
            "[global]\nuser=no"
        );
        let calls = process.calls();
        assert_eq!(calls[0].program, python);
        assert!(calls[0].args[0].ends_with("get-pip.py"));
    }

    #[test]
    fn failures_are_swallowed() {
        let temp = tempdir().unwrap();
        let cache = temp.path().join(".cache");
        let python = temp.path().join("bin/python");

        let offline = FakeHttp::new();
        let process = FakeProcess::new(|_, _| ok(""));
        assert!(!bootstrap_pip(&process, &offline, temp.path(), &python, &cache));
        assert!(process.calls().is_empty());

        let http = FakeHttp::new().with_body(GET_PIP_URL, b"print('pip')");
        let failing = FakeProcess::new(|_, _| exit(1, "", "ssl error"));
        assert!(!bootstrap_pip(&failing, &http, temp.path(), &python, &cache));
    }
}
