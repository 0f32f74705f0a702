pub(crate) mod effects;
pub(crate) mod process;

mod facade;

pub(crate) const PENV_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use facade::{format_status_message, to_json_response, CommandGroup};
