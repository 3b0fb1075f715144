//! Manifest assembly
//!
//! For each album cover and track audio file referenced by the catalog the
//! builder records size, MD5 and mtime. A referenced file that is absent
//! yields nulls for all three; that is "asset referenced but missing", not
//! an error.

use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_library::checksum::md5_hex_stream;
use core_library::models::{is_safe_asset_filename, Manifest, ManifestAlbum, ManifestTrack};
use core_runtime::config::FailurePolicy;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, field, info, instrument, warn};

use crate::catalog::CatalogStore;
use crate::error::Result;

/// Where the served assets live and how to treat an unreadable catalog.
#[derive(Debug, Clone)]
pub struct ManifestBuilderConfig {
    /// Directory served at `/uploads/audio`
    pub audio_dir: PathBuf,
    /// Directory served at `/uploads/covers`
    pub covers_dir: PathBuf,
    /// `FailOpen` turns an unreadable collection into an empty one
    pub catalog_policy: FailurePolicy,
}

impl ManifestBuilderConfig {
    /// Standard `uploads/audio` + `uploads/covers` layout, failing open.
    pub fn for_uploads_dir(uploads_dir: impl Into<PathBuf>) -> Self {
        let uploads_dir = uploads_dir.into();
        Self {
            audio_dir: uploads_dir.join("audio"),
            covers_dir: uploads_dir.join("covers"),
            catalog_policy: FailurePolicy::FailOpen,
        }
    }

    pub fn with_catalog_policy(mut self, policy: FailurePolicy) -> Self {
        self.catalog_policy = policy;
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct AssetFacts {
    size: Option<u64>,
    md5: Option<String>,
    updated_at: Option<i64>,
}

pub struct ManifestBuilder {
    catalog: Arc<dyn CatalogStore>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    config: ManifestBuilderConfig,
}

impl ManifestBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        config: ManifestBuilderConfig,
    ) -> Self {
        Self {
            catalog,
            fs,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ManifestBuilderConfig {
        &self.config
    }

    /// Build a full manifest whose asset URLs are rooted at `base_url`
    /// (scheme + host as the client reaches this server, no trailing path).
    ///
    /// # Errors
    ///
    /// Only with [`FailurePolicy::FailClosed`], when the catalog cannot be read.
    #[instrument(skip(self), fields(albums = field::Empty, tracks = field::Empty))]
    pub async fn build(&self, base_url: &str) -> Result<Manifest> {
        let base = base_url.trim_end_matches('/');

        let albums = match self.catalog.albums().await {
            Ok(albums) => albums,
            Err(e) if self.config.catalog_policy.is_fail_open() => {
                warn!(error = %e, "Album catalog unreadable; publishing no albums");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let tracks = match self.catalog.tracks().await {
            Ok(tracks) => tracks,
            Err(e) if self.config.catalog_policy.is_fail_open() => {
                warn!(error = %e, "Track catalog unreadable; publishing no tracks");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        tracing::Span::current().record("albums", albums.len() as u64);
        tracing::Span::current().record("tracks", tracks.len() as u64);

        let mut albums_out = Vec::with_capacity(albums.len());
        for album in albums {
            let cover_filename = non_empty(album.cover_filename);
            let facts = match &cover_filename {
                Some(name) => self.asset_facts(&self.config.covers_dir, name).await,
                None => AssetFacts::default(),
            };

            albums_out.push(ManifestAlbum {
                id: album.id,
                title: album.title.unwrap_or_default(),
                artist: album.artist.unwrap_or_default(),
                cover_url: cover_filename
                    .as_deref()
                    .map(|name| asset_url(base, "covers", name)),
                cover_filename,
                cover_size: facts.size,
                cover_md5: facts.md5,
                updated_at: facts.updated_at,
            });
        }

        let mut tracks_out = Vec::with_capacity(tracks.len());
        for track in tracks {
            let audio_filename = non_empty(track.audio_filename);
            let facts = match &audio_filename {
                Some(name) => self.asset_facts(&self.config.audio_dir, name).await,
                None => AssetFacts::default(),
            };

            tracks_out.push(ManifestTrack {
                id: track.id,
                title: track.title.unwrap_or_default(),
                artist: track.artist.unwrap_or_default(),
                genre: track.genre.unwrap_or_default(),
                album_id: non_empty(track.album_id),
                audio_url: audio_filename
                    .as_deref()
                    .map(|name| asset_url(base, "audio", name)),
                audio_filename,
                audio_size: facts.size,
                audio_md5: facts.md5,
                updated_at: facts.updated_at,
            });
        }

        let manifest = Manifest::new(self.clock.unix_timestamp_millis(), albums_out, tracks_out);
        info!(
            version = manifest.version,
            albums = manifest.albums.len(),
            tracks = manifest.tracks.len(),
            "Built manifest"
        );
        Ok(manifest)
    }

    /// Stat + hash one asset. Every failure degrades to nulls.
    async fn asset_facts(&self, dir: &std::path::Path, filename: &str) -> AssetFacts {
        if !is_safe_asset_filename(filename) {
            warn!(filename, "Refusing to stat asset with a path-like name");
            return AssetFacts::default();
        }

        let path = dir.join(filename);
        match self.fs.exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(filename, "Referenced asset is absent");
                return AssetFacts::default();
            }
            Err(e) => {
                warn!(filename, error = %e, "Could not check asset");
                return AssetFacts::default();
            }
        }

        let metadata = match self.fs.metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(filename, error = %e, "Could not stat asset");
                return AssetFacts::default();
            }
        };

        let md5 = match self.fs.open_read_stream(&path).await {
            Ok(mut reader) => match md5_hex_stream(&mut reader).await {
                Ok((digest, _)) => Some(digest),
                Err(e) => {
                    warn!(filename, error = %e, "Could not hash asset");
                    None
                }
            },
            Err(e) => {
                warn!(filename, error = %e, "Could not open asset");
                None
            }
        };

        // Size and hash are published together or not at all.
        let size = md5.as_ref().map(|_| metadata.size);

        AssetFacts {
            size,
            md5,
            updated_at: metadata.modified_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// `<base>/uploads/<kind>/<escaped filename>`
pub fn asset_url(base: &str, kind: &str, filename: &str) -> String {
    format!(
        "{}/uploads/{}/{}",
        base.trim_end_matches('/'),
        kind,
        urlencoding::encode(filename)
    )
}
