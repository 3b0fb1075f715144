//! # Library Module
//!
//! Data model shared by the manifest server and the sync client, plus the
//! client-side persistence of the materialized library.
//!
//! ## Overview
//!
//! - [`models`]: the wire manifest, the local library descriptor and the
//!   version marker, with the exact JSON field names the tablet app reads
//! - [`checksum`]: MD5 helpers used on both sides of the wire
//! - [`repositories`]: the `LocalStateRepository` seam with file-backed and
//!   in-memory implementations

pub mod checksum;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    LibraryDescriptor, LibraryItem, LibraryStats, Manifest, ManifestAlbum, ManifestTrack,
    VersionMarker,
};
pub use repositories::{
    FileLocalStateRepository, InMemoryLocalStateRepository, LocalStateRepository,
};
