use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use zip::ZipArchive;

use penv_domain::PlatformSignature;

use crate::core::fs::remove_path;
use crate::core::net::{fetch_cached, filename_from_url};
use crate::effects::HttpClient;

pub(crate) const PORTABLE_DIR_NAME: &str = "portable-python";

/// python-build-standalone "install_only" archives for hosts that commonly
/// lack a usable system interpreter.
const PORTABLE_PYTHONS: &[(&str, &str)] = &[
    (
        "windows_amd64",
        "https://github.com/indygreg/python-build-standalone/releases/download/20240107/cpython-3.11.7+20240107-x86_64-pc-windows-msvc-shared-install_only.tar.gz",
    ),
    (
        "windows_x86",
        "https://github.com/indygreg/python-build-standalone/releases/download/20240107/cpython-3.11.7+20240107-i686-pc-windows-msvc-shared-install_only.tar.gz",
    ),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Zip,
}

fn archive_kind(name: &str) -> Result<ArchiveKind> {
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".zip") {
        Ok(ArchiveKind::Zip)
    } else {
        bail!("unsupported archive format for {name}")
    }
}

/// Downloads and unpacks a self-contained interpreter for the host.
pub struct PortableRuntimeFetcher<'a> {
    http: &'a dyn HttpClient,
    platform: &'a PlatformSignature,
    url_override: Option<&'a str>,
}

impl<'a> PortableRuntimeFetcher<'a> {
    #[must_use]
    pub fn new(
        http: &'a dyn HttpClient,
        platform: &'a PlatformSignature,
        url_override: Option<&'a str>,
    ) -> Self {
        Self {
            http,
            platform,
            url_override,
        }
    }

    /// Archive URL registered for the host, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url_override.or_else(|| {
            PORTABLE_PYTHONS
                .iter()
                .find(|(signature, _)| *signature == self.platform.as_str())
                .map(|(_, url)| *url)
        })
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.url().is_some()
    }

    /// Whether `python` lives inside a runtime this fetcher unpacked.
    pub(crate) fn owns(python: &Path, cache_dir: &Path) -> bool {
        python.starts_with(cache_dir.join(PORTABLE_DIR_NAME))
    }

    /// Interpreter of a freshly unpacked runtime under `cache_dir`, or `None`
    /// when the host has no runtime registered or any step fails.
    pub fn fetch(&self, cache_dir: &Path) -> Option<PathBuf> {
        let Some(url) = self.url() else {
            debug!(platform = %self.platform, "no portable python registered for this platform");
            return None;
        };
        match self.fetch_from(url, cache_dir) {
            Ok(python) => {
                info!(python = %python.display(), "portable python is ready");
                Some(python)
            }
            Err(err) => {
                debug!(url, error = %format!("{err:#}"), "could not fetch portable python");
                None
            }
        }
    }

    fn fetch_from(&self, url: &str, cache_dir: &Path) -> Result<PathBuf> {
        let name = filename_from_url(url);
        let kind = archive_kind(&name)?;
        info!(url, "downloading portable python");
        let archive = fetch_cached(self.http, url, &cache_dir.join(&name))?;

        let dest = cache_dir.join(PORTABLE_DIR_NAME);
        remove_path(&dest)?;
        fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;
        debug!(archive = %archive.display(), dest = %dest.display(), "unpacking portable python");
        extract_archive(&archive, &dest, kind)?;

        let conventional = conventional_interpreter(&dest, self.platform.is_windows());
        if conventional.is_file() {
            return Ok(conventional);
        }
        locate_python_binary(&dest, self.platform.is_windows())
    }
}

fn conventional_interpreter(root: &Path, windows: bool) -> PathBuf {
    if windows {
        root.join("python").join("python.exe")
    } else {
        root.join("python").join("bin").join("python3")
    }
}

fn extract_archive(archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<()> {
    match kind {
        ArchiveKind::TarGz => {
            let file = File::open(archive)
                .with_context(|| format!("opening python archive {}", archive.display()))?;
            let decoder = GzDecoder::new(file);
            let mut tar = Archive::new(decoder);
            tar.unpack(dest)
                .with_context(|| format!("extracting archive into {}", dest.display()))?;
        }
        ArchiveKind::Zip => {
            let file = File::open(archive)
                .with_context(|| format!("opening python archive {}", archive.display()))?;
            let mut archive = ZipArchive::new(file)
                .with_context(|| format!("reading zip archive {}", archive.display()))?;
            archive
                .extract(dest)
                .with_context(|| format!("extracting zip archive into {}", dest.display()))?;
        }
    }
    Ok(())
}

fn locate_python_binary(root: &Path, windows: bool) -> Result<PathBuf> {
    let candidates: &[&str] = if windows {
        &["python.exe", "python3.exe"]
    } else {
        &["python3", "python"]
    };
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("inspecting {}", path.display()))?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let normalized = if windows {
                name.to_ascii_lowercase()
            } else {
                name.to_string()
            };
            if candidates.iter().any(|candidate| *candidate == normalized) {
                return Ok(path);
            }
        }
    }
    bail!("unable to locate python binary in portable runtime")
}
