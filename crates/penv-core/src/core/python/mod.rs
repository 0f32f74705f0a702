//! Interpreter discovery, compatibility probing, and portable runtimes.

pub(crate) mod check;
pub(crate) mod discovery;
pub(crate) mod portable;
pub(crate) mod probe;

pub use check::VerdictKind;
pub use discovery::InterpreterDiscovery;
pub use portable::PortableRuntimeFetcher;
pub use probe::{probe, CompatibilityReport};
