#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod paths;
pub mod platform;
pub mod state;

pub use paths::{PathOverrides, PathResolver, CACHE_DIR_NAME, ROOT_DIR_NAME, STATE_FILENAME};
pub use platform::{bin_dir_name, executable_name, PlatformSignature};
pub use state::{EnvironmentState, StateStore, UPGRADE_CHECK_INTERVAL};
