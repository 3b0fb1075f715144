//! # Sync Coordinator
//!
//! Brings the local library in line with the server's manifest.
//!
//! ## Workflow
//!
//! 1. Ensure `library/`, `library/audio/` and `library/covers/` exist
//! 2. Fetch the manifest
//! 3. Cover pass: verify each album cover, download the ones that fail
//! 4. Track pass: verify each audio file, download the ones that fail, and
//!    build one descriptor item per track
//! 5. Persist `library.json` and `version.json` wholesale
//! 6. Optionally delete files no longer referenced by the manifest
//!
//! Any transport failure aborts the pass before step 5, so the persisted
//! state stays at the previous version and a retry starts from there.
//! Files already downloaded in the aborted pass stay on disk and are picked
//! up by the integrity check next time.
//!
//! ## Version probe
//!
//! [`SyncCoordinator::synchronize`] always runs a full pass. Callers that
//! want to avoid the work when nothing changed use
//! [`SyncCoordinator::check_for_update`] first, or [`SyncCoordinator::sync_if_stale`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncOptions};
//!
//! # async fn example(coordinator: SyncCoordinator) -> core_sync::Result<()> {
//! if let Some(report) = coordinator.sync_if_stale(SyncOptions { cleanup: true }).await? {
//!     println!("Synced {} tracks at v{}", report.items.len(), report.version);
//! }
//! # Ok(())
//! # }
//! ```

use crate::integrity::{ExpectedAsset, IntegrityChecker};
use crate::{Result, SyncError};
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_library::models::is_safe_asset_filename;
use core_library::{
    LibraryDescriptor, LibraryItem, LibraryStats, LocalStateRepository, Manifest, ManifestAlbum,
    VersionMarker,
};
use core_runtime::config::IntegrityConfig;
use core_runtime::events::{AssetKind, CoreEvent, EventBus, LibraryEvent, SyncEvent};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Suffix of in-flight downloads. Renamed away on success; anything left
/// over is an orphan.
const PARTIAL_SUFFIX: &str = ".part";

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Absolute URL of the manifest endpoint
    pub manifest_url: String,

    /// Library root; holds `library.json`, `version.json`, `audio/`, `covers/`
    pub library_root: PathBuf,

    /// Integrity check tuning
    pub integrity: IntegrityConfig,

    /// Retries for the manifest request. Asset downloads are not retried.
    pub manifest_retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(manifest_url: impl Into<String>, library_root: impl Into<PathBuf>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            library_root: library_root.into(),
            integrity: IntegrityConfig::default(),
            manifest_retry: RetryPolicy::default(),
        }
    }

    pub fn with_integrity(mut self, integrity: IntegrityConfig) -> Self {
        self.integrity = integrity;
        self
    }

    pub fn with_manifest_retry(mut self, policy: RetryPolicy) -> Self {
        self.manifest_retry = policy;
        self
    }

    /// Local directory for assets of `kind`.
    pub fn asset_dir(&self, kind: AssetKind) -> PathBuf {
        self.library_root.join(kind.dir_name())
    }
}

/// Per-pass options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete local assets the manifest no longer references
    pub cleanup: bool,
}

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Manifest version now persisted locally
    pub version: i64,
    /// Descriptor items written, in manifest track order
    pub items: Vec<LibraryItem>,
    pub downloaded: usize,
    pub skipped: usize,
    pub removed: usize,
}

/// Outcome of the cheap version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub remote_version: i64,
    /// `None` when no sync has completed on this device yet
    pub local_version: Option<i64>,
    pub needs_sync: bool,
}

impl UpdateCheck {
    /// A sync is needed when the remote version is strictly newer, or when
    /// there is no local version at all.
    pub fn new(remote_version: i64, local_version: Option<i64>) -> Self {
        let needs_sync = local_version.map_or(true, |local| remote_version > local);
        Self {
            remote_version,
            local_version,
            needs_sync,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetOutcome {
    Skipped,
    Downloaded(u64),
}

#[derive(Debug, Default)]
struct PassCounters {
    downloaded: usize,
    skipped: usize,
}

impl PassCounters {
    fn record(&mut self, outcome: AssetOutcome) {
        match outcome {
            AssetOutcome::Skipped => self.skipped += 1,
            AssetOutcome::Downloaded(_) => self.downloaded += 1,
        }
    }
}

/// Manifest-driven sync of the local library.
///
/// One pass at a time: a call made while another pass holds the guard
/// returns [`SyncError::SyncInProgress`] immediately.
pub struct SyncCoordinator {
    config: SyncConfig,
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystemAccess>,
    state: Arc<dyn LocalStateRepository>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    integrity: IntegrityChecker,
    pass_guard: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn FileSystemAccess>,
        state: Arc<dyn LocalStateRepository>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let integrity = IntegrityChecker::new(file_system.clone(), config.integrity);
        Self {
            config,
            http_client,
            file_system,
            state,
            clock,
            event_bus,
            integrity,
            pass_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bus carrying this coordinator's [`SyncEvent`]s.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Whether a pass is currently running.
    pub fn is_syncing(&self) -> bool {
        self.pass_guard.try_lock().is_err()
    }

    /// Run one full sync pass.
    ///
    /// Always downloads whatever fails the integrity check and always
    /// rewrites both local files, whatever the local version is.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SyncInProgress`] if another pass is running
    /// - [`SyncError::Transport`] / [`SyncError::InvalidManifest`] if the
    ///   manifest or an asset could not be fetched; nothing is persisted
    /// - [`SyncError::Bridge`] / [`SyncError::Library`] if the local layout
    ///   or state could not be written
    #[instrument(skip(self))]
    pub async fn synchronize(&self, options: SyncOptions) -> Result<SyncReport> {
        let _guard = self
            .pass_guard
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress)?;

        let started = Instant::now();
        self.emit(SyncEvent::Started {
            cleanup: options.cleanup,
        });

        match self.run_pass(options).await {
            Ok(report) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    version = report.version,
                    items = report.items.len(),
                    downloaded = report.downloaded,
                    skipped = report.skipped,
                    removed = report.removed,
                    duration_ms,
                    "Sync complete"
                );
                self.emit(SyncEvent::Completed {
                    version: report.version,
                    items: report.items.len(),
                    downloaded: report.downloaded,
                    skipped: report.skipped,
                    removed: report.removed,
                    duration_ms,
                });
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                self.emit(SyncEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Fetch the manifest and compare its version with the local marker.
    #[instrument(skip(self))]
    pub async fn check_for_update(&self) -> Result<UpdateCheck> {
        let manifest = self.fetch_manifest().await?;
        let local_version = self.local_version().await?;
        let check = UpdateCheck::new(manifest.version, local_version);
        debug!(
            remote = check.remote_version,
            local = ?check.local_version,
            needs_sync = check.needs_sync,
            "Version probe"
        );
        Ok(check)
    }

    /// Probe first, then run a pass only if the remote version is newer.
    ///
    /// Returns `None` when the local library is already current.
    pub async fn sync_if_stale(&self, options: SyncOptions) -> Result<Option<SyncReport>> {
        let check = self.check_for_update().await?;
        if !check.needs_sync {
            info!(version = check.remote_version, "Library up to date");
            return Ok(None);
        }
        self.synchronize(options).await.map(Some)
    }

    /// Last persisted descriptor, or `None` if there is none (or it is unreadable).
    pub async fn load_local_library(&self) -> Result<Option<LibraryDescriptor>> {
        Ok(self.state.load_library().await?)
    }

    /// Last persisted manifest version.
    pub async fn local_version(&self) -> Result<Option<i64>> {
        Ok(self.state.load_version().await?.map(|marker| marker.version))
    }

    /// Offline availability of the persisted library.
    pub async fn library_stats(&self) -> Result<Option<LibraryStats>> {
        Ok(self.load_local_library().await?.map(|d| d.stats()))
    }

    async fn run_pass(&self, options: SyncOptions) -> Result<SyncReport> {
        self.ensure_layout().await?;

        let manifest = self.fetch_manifest().await?;
        info!(
            version = manifest.version,
            albums = manifest.albums.len(),
            tracks = manifest.tracks.len(),
            "Fetched manifest"
        );
        self.emit(SyncEvent::ManifestFetched {
            version: manifest.version,
            albums: manifest.albums.len(),
            tracks: manifest.tracks.len(),
        });

        let albums_by_id: HashMap<&str, &ManifestAlbum> = manifest
            .albums
            .iter()
            .map(|album| (album.id.as_str(), album))
            .collect();

        let mut counters = PassCounters::default();

        // Covers first, so tracks can pick up the local path.
        let mut cover_paths: HashMap<&str, PathBuf> = HashMap::new();
        let mut needed_covers: HashSet<&str> = HashSet::new();
        for album in &manifest.albums {
            let (Some(filename), Some(url)) =
                (non_empty(&album.cover_filename), non_empty(&album.cover_url))
            else {
                continue;
            };
            let Some(dest) = self.local_path(AssetKind::Cover, filename) else {
                continue;
            };

            let expected = ExpectedAsset {
                kind: AssetKind::Cover,
                size: album.cover_size,
                md5: album.cover_md5.as_deref(),
            };
            let outcome = self
                .ensure_asset(filename, url, &dest, expected)
                .await?;
            counters.record(outcome);

            cover_paths.insert(filename, dest);
            needed_covers.insert(filename);
        }

        let mut items = Vec::with_capacity(manifest.tracks.len());
        let mut needed_audio: HashSet<&str> = HashSet::new();
        for track in &manifest.tracks {
            let mut local_audio_path = None;
            if let (Some(filename), Some(url)) =
                (non_empty(&track.audio_filename), non_empty(&track.audio_url))
            {
                if let Some(dest) = self.local_path(AssetKind::Audio, filename) {
                    let expected = ExpectedAsset {
                        kind: AssetKind::Audio,
                        size: track.audio_size,
                        md5: track.audio_md5.as_deref(),
                    };
                    let outcome = self
                        .ensure_asset(filename, url, &dest, expected)
                        .await?;
                    counters.record(outcome);

                    local_audio_path = Some(dest);
                    needed_audio.insert(filename);
                }
            }

            // A dangling albumId resolves to no album; the track still syncs.
            let album = track
                .album_id
                .as_deref()
                .and_then(|id| albums_by_id.get(id))
                .copied();
            let image_filename = album.and_then(|a| non_empty(&a.cover_filename));

            items.push(LibraryItem {
                id: track.id.clone(),
                title: track.title.clone(),
                artist: track.artist.clone(),
                album: album
                    .map(|a| a.title.clone())
                    .filter(|title| !title.is_empty()),
                genre: track.genre.clone(),
                audio_url: track.audio_filename.clone().unwrap_or_default(),
                image_url: image_filename.map(str::to_string),
                local_audio_path,
                local_image_path: image_filename.and_then(|name| cover_paths.get(name).cloned()),
                audio_md5: track.audio_md5.clone().filter(|d| !d.is_empty()),
                image_md5: album
                    .and_then(|a| a.cover_md5.clone())
                    .filter(|d| !d.is_empty()),
            });
        }

        let descriptor = LibraryDescriptor {
            version: manifest.version,
            items,
        };
        self.persist(&descriptor).await?;

        let mut removed = 0;
        if options.cleanup {
            removed += self.remove_orphans(AssetKind::Cover, &needed_covers).await;
            removed += self.remove_orphans(AssetKind::Audio, &needed_audio).await;
        }

        Ok(SyncReport {
            version: descriptor.version,
            items: descriptor.items,
            downloaded: counters.downloaded,
            skipped: counters.skipped,
            removed,
        })
    }

    async fn ensure_layout(&self) -> Result<()> {
        self.file_system
            .create_dir_all(&self.config.library_root)
            .await?;
        for kind in [AssetKind::Audio, AssetKind::Cover] {
            self.file_system
                .create_dir_all(&self.config.asset_dir(kind))
                .await?;
        }
        Ok(())
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        let url = self.config.manifest_url.as_str();
        let request = HttpRequest::get(url).header("Accept", "application/json");

        let response = self
            .http_client
            .execute_with_retry(request, self.config.manifest_retry.clone())
            .await
            .map_err(|e| SyncError::transport(url, e))?
            .error_for_status(url)
            .map_err(|e| SyncError::transport(url, e))?;

        response
            .json::<Manifest>()
            .map_err(|e| SyncError::InvalidManifest(e.to_string()))
    }

    /// Destination for a manifest filename, or `None` if the name would
    /// escape the asset directory.
    fn local_path(&self, kind: AssetKind, filename: &str) -> Option<PathBuf> {
        if !is_safe_asset_filename(filename) {
            warn!(%kind, filename, "Skipping asset with a path-like name");
            return None;
        }
        Some(self.config.asset_dir(kind).join(filename))
    }

    async fn ensure_asset(
        &self,
        filename: &str,
        url: &str,
        dest: &Path,
        expected: ExpectedAsset<'_>,
    ) -> Result<AssetOutcome> {
        let kind = expected.kind;
        let verdict = self.integrity.verify(dest, expected).await;
        if verdict.is_valid(self.integrity.policy()) {
            debug!(%kind, filename, ?verdict, "Local copy is valid");
            self.emit(SyncEvent::AssetSkipped {
                kind,
                filename: filename.to_string(),
            });
            return Ok(AssetOutcome::Skipped);
        }

        debug!(%kind, filename, ?verdict, "Downloading asset");
        let bytes = self.download(url, dest).await?;
        if let Some(size) = expected.size {
            if size != bytes {
                warn!(%kind, filename, expected = size, actual = bytes, "Downloaded size differs from manifest");
            }
        }

        self.emit(SyncEvent::AssetDownloaded {
            kind,
            filename: filename.to_string(),
            bytes,
        });
        Ok(AssetOutcome::Downloaded(bytes))
    }

    /// Stream `url` into `<dest>.part`, then rename over `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut partial = dest.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let mut reader = self
            .http_client
            .download_stream(url.to_string())
            .await
            .map_err(|e| SyncError::transport(url, e))?;
        let mut writer = self.file_system.open_write_stream(&partial).await?;

        let copied = async {
            let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;
        drop(writer);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cleanup) = self.file_system.delete_file(&partial).await {
                    debug!(error = %cleanup, "Could not remove partial download");
                }
                return Err(SyncError::transport(url, e));
            }
        };

        self.file_system.rename(&partial, dest).await?;
        Ok(bytes)
    }

    async fn persist(&self, descriptor: &LibraryDescriptor) -> Result<()> {
        let marker = VersionMarker {
            version: descriptor.version,
            at: self.clock.unix_timestamp_millis(),
        };
        self.state.save_snapshot(descriptor, &marker).await?;

        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::DescriptorSaved {
                version: descriptor.version,
                items: descriptor.items.len(),
            }))
            .ok();
        Ok(())
    }

    /// Best-effort removal of files in the `kind` directory whose names are
    /// not in `needed`. Never fails the pass.
    async fn remove_orphans(&self, kind: AssetKind, needed: &HashSet<&str>) -> usize {
        let dir = self.config.asset_dir(kind);
        let entries = match self.file_system.list_directory(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(%kind, error = %e, "Could not list asset directory; skipping cleanup");
                return 0;
            }
        };

        let mut removed = 0;
        for path in entries {
            let Some(raw) = path.file_name() else {
                continue;
            };
            // A name that is not UTF-8 can never match a manifest filename.
            if raw.to_str().is_some_and(|name| needed.contains(name)) {
                continue;
            }
            let lossy = raw.to_string_lossy();
            let name = lossy.as_ref();

            match self.file_system.delete_file(&path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(%kind, filename = name, error = %e, "Could not delete orphan");
                    continue;
                }
            }

            info!(%kind, filename = name, "Deleted orphan asset");
            self.emit(SyncEvent::AssetOrphanRemoved {
                kind,
                filename: name.to_string(),
            });
            removed += 1;
        }
        removed
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
