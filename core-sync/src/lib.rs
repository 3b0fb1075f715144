//! # Sync Module
//!
//! Client side of the manifest protocol.
//!
//! ## Overview
//!
//! A tablet keeps an offline copy of the archive under a library root. This
//! crate fetches the server manifest, verifies every local asset against the
//! advertised size and MD5, downloads what is missing or stale, and rewrites
//! the local library descriptor and version marker.
//!
//! ## Components
//!
//! - **Integrity Checker** (`integrity`): exists / size / hash checks with a
//!   configurable hash ceiling and failure policy
//! - **Sync Coordinator** (`coordinator`): the sync pass, the version probe
//!   and the read-side accessors for the persisted library

pub mod coordinator;
pub mod error;
pub mod integrity;

pub use coordinator::{SyncConfig, SyncCoordinator, SyncOptions, SyncReport, UpdateCheck};
pub use error::{Result, SyncError};
pub use integrity::{ExpectedAsset, IntegrityChecker, IntegrityVerdict};
