//! bsod-core
//!
//! Core library for post-mortem analysis of Windows crash dumps.
//!
//! This crate decodes structured minidumps and kernel memory dump headers,
//! resolves stack addresses against the loaded module list, and attributes
//! the crash to a probable driver using built-in knowledge tables. It also
//! owns the crash history database and on-disk configuration.
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends; the `bsod-analyzer` CLI is a thin wrapper.

pub mod analysis;
pub mod db;
pub mod dump;
pub mod knowledge;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
