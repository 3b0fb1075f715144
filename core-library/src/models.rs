//! Domain models for the archive library
//!
//! Field names follow the JSON the manifest endpoint produces and the tablet
//! app persists (`camelCase`, with `MD5` upper-cased), so these types are
//! the wire format as well as the in-memory model.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

// =============================================================================
// Manifest
// =============================================================================

/// Server-computed snapshot of every album and track plus per-asset size
/// and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Build time, epoch milliseconds. Informational only.
    #[serde(deserialize_with = "millis")]
    pub generated_at: i64,
    /// Max `updatedAt` across all albums and tracks, floored at 0.
    #[serde(deserialize_with = "millis")]
    pub version: i64,
    #[serde(default)]
    pub albums: Vec<ManifestAlbum>,
    #[serde(default)]
    pub tracks: Vec<ManifestTrack>,
}

impl Manifest {
    /// Assemble a manifest, deriving `version` from the entries.
    pub fn new(generated_at: i64, albums: Vec<ManifestAlbum>, tracks: Vec<ManifestTrack>) -> Self {
        let version = compute_version(&albums, &tracks);
        Self {
            generated_at,
            version,
            albums,
            tracks,
        }
    }

    /// A well-formed manifest with no content.
    pub fn empty(generated_at: i64) -> Self {
        Self::new(generated_at, Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty() && self.tracks.is_empty()
    }
}

/// `max(0, updatedAt...)` over albums and tracks; null timestamps count as 0.
pub fn compute_version(albums: &[ManifestAlbum], tracks: &[ManifestTrack]) -> i64 {
    albums
        .iter()
        .map(|a| a.updated_at.unwrap_or(0))
        .chain(tracks.iter().map(|t| t.updated_at.unwrap_or(0)))
        .fold(0, i64::max)
}

/// Album entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAlbum {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub artist: String,
    #[serde(default)]
    pub cover_filename: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub cover_size: Option<u64>,
    #[serde(default, rename = "coverMD5")]
    pub cover_md5: Option<String>,
    /// Cover file mtime, epoch milliseconds; null when the file is absent.
    #[serde(default, deserialize_with = "opt_millis")]
    pub updated_at: Option<i64>,
}

/// Track entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTrack {
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub artist: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub genre: String,
    /// May dangle if the album was deleted.
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub audio_filename: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_size: Option<u64>,
    #[serde(default, rename = "audioMD5")]
    pub audio_md5: Option<String>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub updated_at: Option<i64>,
}

/// Whether a manifest filename can be used verbatim as a single path
/// component under an asset directory.
///
/// Names are taken from the catalog as-is, so anything that could step
/// outside the directory is refused: separators and `..` everywhere, and a
/// drive prefix on Windows. `A:intro.mp3` is an ordinary name elsewhere.
pub fn is_safe_asset_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !(cfg!(windows) && has_drive_prefix(name))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

// =============================================================================
// Local state
// =============================================================================

/// One playable track as materialized on the device.
///
/// `audio_url` and `image_url` hold the remote *filenames*, not URLs; the
/// names are kept for compatibility with descriptors written by the
/// existing tablet app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Denormalized album title; null for tracks without a resolvable album.
    pub album: Option<String>,
    pub genre: String,
    /// Audio filename, or empty when the track has none.
    pub audio_url: String,
    /// Cover filename of the resolved album.
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_audio_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_image_path: Option<PathBuf>,
    #[serde(default, rename = "audioMD5", skip_serializing_if = "Option::is_none")]
    pub audio_md5: Option<String>,
    #[serde(default, rename = "imageMD5", skip_serializing_if = "Option::is_none")]
    pub image_md5: Option<String>,
}

impl LibraryItem {
    /// Whether the audio for this item is available offline.
    pub fn is_available_offline(&self) -> bool {
        self.local_audio_path.is_some()
    }
}

/// Persisted `library.json`: the full materialized library for one version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    #[serde(deserialize_with = "millis")]
    pub version: i64,
    #[serde(default)]
    pub items: Vec<LibraryItem>,
}

impl LibraryDescriptor {
    pub fn stats(&self) -> LibraryStats {
        let synced = self
            .items
            .iter()
            .filter(|item| item.is_available_offline())
            .count();
        LibraryStats {
            total: self.items.len(),
            synced,
            pending: self.items.len() - synced,
        }
    }
}

/// Persisted `version.json`: cheap staleness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker {
    #[serde(deserialize_with = "millis")]
    pub version: i64,
    /// When the marker was written, epoch milliseconds.
    #[serde(deserialize_with = "millis")]
    pub at: i64,
}

/// Offline availability counts for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total: usize,
    pub synced: usize,
    pub pending: usize,
}

// =============================================================================
// Serde helpers
// =============================================================================

// File mtimes from the Node admin server arrive as fractional milliseconds.
fn number_to_millis<E: serde::de::Error>(n: serde_json::Number) -> Result<i64, E> {
    n.as_i64()
        .or_else(|| n.as_u64().map(|v| v.min(i64::MAX as u64) as i64))
        .or_else(|| n.as_f64().map(|v| v.trunc() as i64))
        .ok_or_else(|| E::custom(format!("invalid millisecond timestamp: {}", n)))
}

fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = serde_json::Number::deserialize(deserializer)?;
    number_to_millis(n)
}

fn opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Number>::deserialize(deserializer)? {
        Some(n) => number_to_millis(n).map(Some),
        None => Ok(None),
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
