//! # Manifest Module
//!
//! Server-side assembly of the sync manifest.
//!
//! The catalog (albums and tracks curated in the admin panel) is read through
//! a [`CatalogStore`]; every referenced asset is stat'ed and hashed through
//! `FileSystemAccess`; the result is a [`Manifest`](core_library::Manifest)
//! whose `version` only moves forward as long as file mtimes do.
//!
//! The manifest is rebuilt on every request. There is no caching and no
//! incremental form.

pub mod builder;
pub mod catalog;
pub mod error;

pub use builder::{ManifestBuilder, ManifestBuilderConfig};
pub use catalog::{AlbumRecord, CatalogStore, InMemoryCatalogStore, JsonCatalogStore, TrackRecord};
pub use error::{ManifestError, Result};
