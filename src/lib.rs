//! Workspace facade crate.
//!
//! Re-exports the workspace crates behind feature flags so a host can depend
//! on `museo-sync-workspace` alone:
//!
//! - `desktop-shims` (default): the sync core with desktop bridges
//! - `server`: the manifest server

#[cfg(feature = "desktop-shims")]
pub use core_service;

#[cfg(feature = "server")]
pub use manifest_server;
