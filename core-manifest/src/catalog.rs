//! Catalog record store
//!
//! The admin panel keeps albums and tracks as two JSON arrays on disk. Only
//! the fields the manifest needs are modelled; anything else in a record
//! (year, description, cover numbering) is ignored.

use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ManifestError, Result};

pub const ALBUMS_FILE_NAME: &str = "albums.json";
pub const TRACKS_FILE_NAME: &str = "tracks.json";

/// Album as curated in the admin panel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub cover_filename: Option<String>,
}

/// Track as curated in the admin panel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub audio_filename: Option<String>,
}

/// Read access to the curated catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All albums, in stored order
    async fn albums(&self) -> Result<Vec<AlbumRecord>>;

    /// All tracks, in stored order
    async fn tracks(&self) -> Result<Vec<TrackRecord>>;
}

/// `albums.json` / `tracks.json` in a data directory.
///
/// A missing or blank file reads as an empty collection (fresh install).
/// A file that cannot be read or decoded is an error; whether that error
/// reaches the client is the builder's [`FailurePolicy`](core_runtime::config::FailurePolicy) decision.
pub struct JsonCatalogStore {
    fs: Arc<dyn FileSystemAccess>,
    data_dir: PathBuf,
}

impl JsonCatalogStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            data_dir: data_dir.into(),
        }
    }

    async fn read_collection<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>> {
        let path = self.data_dir.join(file_name);
        let unavailable = |message: String| ManifestError::CatalogUnavailable {
            collection: file_name.to_string(),
            message,
        };

        if !self.exists(&path).await.map_err(unavailable)? {
            debug!(file = file_name, "Catalog file missing; treating as empty");
            return Ok(Vec::new());
        }

        let raw = self
            .fs
            .read_file(&path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&raw).map_err(|e| unavailable(e.to_string()))
    }

    async fn exists(&self, path: &Path) -> std::result::Result<bool, String> {
        self.fs.exists(path).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn albums(&self) -> Result<Vec<AlbumRecord>> {
        self.read_collection(ALBUMS_FILE_NAME).await
    }

    async fn tracks(&self) -> Result<Vec<TrackRecord>> {
        self.read_collection(TRACKS_FILE_NAME).await
    }
}

/// Fixed catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    pub albums: Vec<AlbumRecord>,
    pub tracks: Vec<TrackRecord>,
}

impl InMemoryCatalogStore {
    pub fn new(albums: Vec<AlbumRecord>, tracks: Vec<TrackRecord>) -> Self {
        Self { albums, tracks }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn albums(&self) -> Result<Vec<AlbumRecord>> {
        Ok(self.albums.clone())
    }

    async fn tracks(&self) -> Result<Vec<TrackRecord>> {
        Ok(self.tracks.clone())
    }
}
