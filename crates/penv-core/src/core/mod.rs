//! Internal implementation modules for `penv-core`.
//!
//! Callers should go through the crate root re-exports rather than importing
//! these modules directly.

pub mod config;
pub mod env;
pub(crate) mod errors;
pub(crate) mod fs;
pub(crate) mod home;
pub(crate) mod net;
pub mod python;
pub mod runtime;
pub mod toolchain;
pub(crate) mod tooling;

#[cfg(test)]
pub(crate) mod test_support;
