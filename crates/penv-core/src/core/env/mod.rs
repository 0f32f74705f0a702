//! Environment construction and package-manager bootstrap.

pub(crate) mod builder;
pub(crate) mod pip;

pub use builder::{BuildOutcome, BuildStrategy, EnvironmentBuilder};
