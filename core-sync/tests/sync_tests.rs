//! Integration tests for the manifest sync pass
//!
//! These tests drive `SyncCoordinator` against an in-process fake archive
//! and a real library directory under a temp dir, covering:
//! - first sync, skip of valid local copies, dangling album references
//! - the size / hash gate
//! - idempotent re-runs
//! - orphan cleanup, including leftover partial downloads
//! - transport failures leaving persisted state untouched
//! - the re-entrancy guard and the version probe

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::{FileMetadata, FileSystemAccess},
    time::FixedClock,
    HttpClient, HttpRequest, HttpResponse, RetryPolicy,
};
use bytes::Bytes;
use core_library::checksum::md5_hex;
use core_library::{
    FileLocalStateRepository, LibraryDescriptor, Manifest, ManifestAlbum, ManifestTrack,
};
use core_runtime::config::{FailurePolicy, IntegrityConfig};
use core_runtime::events::{AssetKind, CoreEvent, EventBus, LibraryEvent, SyncEvent};
use core_sync::{SyncConfig, SyncCoordinator, SyncError, SyncOptions};
use mockall::mock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;
use tokio::sync::Notify;

const BASE: &str = "http://archive.test";
const MANIFEST_URL: &str = "http://archive.test/api/manifest";
const NOW_MS: i64 = 1_800_000_000_000;

// ============================================================================
// Fake archive
// ============================================================================

/// Serves one manifest and a set of asset bodies, counting every request.
#[derive(Default)]
struct FakeArchive {
    manifest: Mutex<Option<String>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    manifest_requests: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl FakeArchive {
    fn publish(&self, manifest: &Manifest, assets: &[(&str, &[u8])]) {
        *self.manifest.lock().unwrap() = Some(serde_json::to_string(manifest).unwrap());
        let mut map = self.assets.lock().unwrap();
        map.clear();
        for (url, body) in assets {
            map.insert(url.to_string(), body.to_vec());
        }
    }

    fn go_offline(&self) {
        *self.manifest.lock().unwrap() = None;
    }

    fn remove_asset(&self, url: &str) {
        self.assets.lock().unwrap().remove(url);
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    fn downloads_of(&self, filename: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.ends_with(&format!("/{}", filename)))
            .count()
    }
}

#[async_trait]
impl HttpClient for FakeArchive {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        assert_eq!(request.url, MANIFEST_URL);
        self.manifest_requests.fetch_add(1, Ordering::SeqCst);
        match self.manifest.lock().unwrap().clone() {
            Some(body) => Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(body),
            }),
            None => Ok(HttpResponse {
                status: 503,
                headers: HashMap::new(),
                body: Bytes::new(),
            }),
        }
    }

    async fn download_stream(
        &self,
        url: String,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.downloads.lock().unwrap().push(url.clone());
        match self.assets.lock().unwrap().get(&url) {
            Some(body) => Ok(Box::new(std::io::Cursor::new(body.clone()))),
            None => Err(BridgeError::HttpStatus { status: 404, url }),
        }
    }
}

/// Holds the manifest request until released, to keep a pass in flight.
struct GatedArchive {
    inner: Arc<FakeArchive>,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl HttpClient for GatedArchive {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.execute(request).await
    }

    async fn download_stream(
        &self,
        url: String,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        self.inner.download_stream(url).await
    }
}

/// Real file system whose audio files cannot be read back for hashing.
struct UnhashableAudio {
    inner: TokioFileSystem,
}

#[async_trait]
impl FileSystemAccess for UnhashableAudio {
    async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
        self.inner.get_data_directory().await
    }
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        self.inner.exists(path).await
    }
    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.inner.metadata(path).await
    }
    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.inner.create_dir_all(path).await
    }
    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.inner.read_file(path).await
    }
    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.inner.write_file(path, data).await
    }
    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.inner.delete_file(path).await
    }
    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        self.inner.rename(from, to).await
    }
    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }
    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        if path.extension().is_some_and(|ext| ext == "mp3") {
            return Err(BridgeError::OperationFailed("EIO".to_string()));
        }
        self.inner.open_read_stream(path).await
    }
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
        self.inner.open_write_stream(path).await
    }
}

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn download_stream(
            &self,
            url: String,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const COVER: &[u8] = &[0xC0; 100];
const AUDIO: &[u8] = &[0xA0; 200];

fn cover_url(name: &str) -> String {
    format!("{}/uploads/covers/{}", BASE, name)
}

fn audio_url(name: &str) -> String {
    format!("{}/uploads/audio/{}", BASE, name)
}

fn album(id: &str, title: &str, cover_name: &str, cover: &[u8]) -> ManifestAlbum {
    ManifestAlbum {
        id: id.to_string(),
        title: title.to_string(),
        artist: "Varios".to_string(),
        cover_filename: Some(cover_name.to_string()),
        cover_url: Some(cover_url(cover_name)),
        cover_size: Some(cover.len() as u64),
        cover_md5: Some(md5_hex(cover)),
        updated_at: Some(1_700_000_000_000),
    }
}

fn track(id: &str, album_id: Option<&str>, audio_name: &str, audio: &[u8]) -> ManifestTrack {
    ManifestTrack {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: "Alejo Durán".to_string(),
        genre: "Son".to_string(),
        album_id: album_id.map(str::to_string),
        audio_filename: Some(audio_name.to_string()),
        audio_url: Some(audio_url(audio_name)),
        audio_size: Some(audio.len() as u64),
        audio_md5: Some(md5_hex(audio)),
        updated_at: Some(1_700_000_500_000),
    }
}

/// Scenario A catalog: album with cover `a.jpg`, track `t.mp3` in that album.
fn scenario_a(archive: &FakeArchive) -> Manifest {
    let manifest = Manifest::new(
        NOW_MS,
        vec![album("alb_1", "Clásicos del Vallenato", "a.jpg", COVER)],
        vec![track("trk_1", Some("alb_1"), "t.mp3", AUDIO)],
    );
    archive.publish(
        &manifest,
        &[(&cover_url("a.jpg"), COVER), (&audio_url("t.mp3"), AUDIO)],
    );
    manifest
}

struct Harness {
    tmp: TempDir,
    archive: Arc<FakeArchive>,
    coordinator: SyncCoordinator,
    events: Receiver<CoreEvent>,
}

impl Harness {
    fn new() -> Self {
        Self::with_parts(IntegrityConfig::default(), None)
    }

    fn with_parts(integrity: IntegrityConfig, fs: Option<Arc<dyn FileSystemAccess>>) -> Self {
        let tmp = TempDir::new().unwrap();
        let archive = Arc::new(FakeArchive::default());
        let fs: Arc<dyn FileSystemAccess> = match fs {
            Some(fs) => fs,
            None => Arc::new(TokioFileSystem::with_data_directory(tmp.path().to_path_buf())),
        };
        let coordinator = coordinator_for(&tmp, archive.clone(), fs, integrity);
        let events = coordinator.event_bus().subscribe();
        Self {
            tmp,
            archive,
            coordinator,
            events,
        }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("library")
    }

    fn audio_dir(&self) -> PathBuf {
        self.root().join("audio")
    }

    fn covers_dir(&self) -> PathBuf {
        self.root().join("covers")
    }

    fn library_json(&self) -> Option<Vec<u8>> {
        std::fs::read(self.root().join("library.json")).ok()
    }

    fn descriptor(&self) -> LibraryDescriptor {
        serde_json::from_slice(&self.library_json().expect("library.json")).unwrap()
    }

    fn seed(&self, dir: &Path, name: &str, body: &[u8]) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn coordinator_for(
    tmp: &TempDir,
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    integrity: IntegrityConfig,
) -> SyncCoordinator {
    coordinator_with_retry(tmp, http, fs, integrity, RetryPolicy::none())
}

fn coordinator_with_retry(
    tmp: &TempDir,
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    integrity: IntegrityConfig,
    retry: RetryPolicy,
) -> SyncCoordinator {
    let root = tmp.path().join("library");
    let bus = EventBus::new(512);
    let state = Arc::new(FileLocalStateRepository::new(fs.clone(), root.clone()));
    SyncCoordinator::new(
        SyncConfig::new(MANIFEST_URL, root)
            .with_integrity(integrity)
            .with_manifest_retry(retry),
        http,
        fs,
        state,
        Arc::new(FixedClock::from_millis(NOW_MS)),
        bus,
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn first_sync_downloads_everything_and_links_cover() {
    let h = Harness::new();
    scenario_a(&h.archive);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.downloaded, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.archive.download_count(), 2);

    let item = &report.items[0];
    assert!(item.local_audio_path.as_ref().unwrap().ends_with("t.mp3"));
    assert!(item.local_image_path.as_ref().unwrap().ends_with("a.jpg"));
    assert_eq!(item.album.as_deref(), Some("Clásicos del Vallenato"));
    assert_eq!(item.audio_url, "t.mp3");
    assert_eq!(item.image_url.as_deref(), Some("a.jpg"));
    assert_eq!(item.audio_md5.as_deref(), Some(md5_hex(AUDIO).as_str()));
    assert_eq!(item.image_md5.as_deref(), Some(md5_hex(COVER).as_str()));

    assert_eq!(std::fs::read(h.audio_dir().join("t.mp3")).unwrap(), AUDIO);
    assert_eq!(std::fs::read(h.covers_dir().join("a.jpg")).unwrap(), COVER);

    let descriptor = h.descriptor();
    assert_eq!(descriptor.version, 1_700_000_500_000);
    assert_eq!(descriptor.items, report.items);

    let marker: serde_json::Value =
        serde_json::from_slice(&std::fs::read(h.root().join("version.json")).unwrap()).unwrap();
    assert_eq!(marker["version"], 1_700_000_500_000i64);
    assert_eq!(marker["at"], NOW_MS);
}

#[tokio::test]
async fn valid_local_audio_is_not_downloaded_but_descriptor_is_rewritten() {
    let h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "t.mp3", AUDIO);
    h.seed(&h.root(), "library.json", br#"{"version": 1, "items": []}"#);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.downloads_of("t.mp3"), 0);
    assert_eq!(h.archive.downloads_of("a.jpg"), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.downloaded, 1);

    let descriptor = h.descriptor();
    assert_eq!(descriptor.version, 1_700_000_500_000);
    assert_eq!(descriptor.items.len(), 1);
}

#[tokio::test]
async fn dangling_album_reference_still_syncs_the_track() {
    let h = Harness::new();
    let manifest = Manifest::new(
        NOW_MS,
        vec![album("alb_1", "Clásicos", "a.jpg", COVER)],
        vec![track("trk_1", Some("missing"), "t.mp3", AUDIO)],
    );
    h.archive.publish(
        &manifest,
        &[(&cover_url("a.jpg"), COVER), (&audio_url("t.mp3"), AUDIO)],
    );

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    let item = &report.items[0];
    assert_eq!(item.album, None);
    assert_eq!(item.image_url, None);
    assert_eq!(item.local_image_path, None);
    assert!(item.local_audio_path.is_some());

    let raw: serde_json::Value = serde_json::from_slice(&h.library_json().unwrap()).unwrap();
    let stored = &raw["items"][0];
    assert!(stored["album"].is_null());
    assert!(stored.get("localImagePath").is_none());
}

#[tokio::test]
async fn cleanup_removes_orphans_and_partial_downloads() {
    let mut h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "orphan.mp3", b"old");
    h.seed(&h.audio_dir(), "t.mp3.part", b"interrupted");
    h.seed(&h.covers_dir(), "old.jpg", b"old");

    let report = h
        .coordinator
        .synchronize(SyncOptions { cleanup: true })
        .await
        .unwrap();

    assert_eq!(report.removed, 3);
    assert!(!h.audio_dir().join("orphan.mp3").exists());
    assert!(!h.audio_dir().join("t.mp3.part").exists());
    assert!(!h.covers_dir().join("old.jpg").exists());
    assert!(h.audio_dir().join("t.mp3").exists());
    assert!(h.covers_dir().join("a.jpg").exists());

    let mut remaining: Vec<String> = std::fs::read_dir(h.audio_dir())
        .unwrap()
        .chain(std::fs::read_dir(h.covers_dir()).unwrap())
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["a.jpg".to_string(), "t.mp3".to_string()]);

    let removed: Vec<_> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            CoreEvent::Sync(SyncEvent::AssetOrphanRemoved { kind, filename }) => {
                Some((kind, filename))
            }
            _ => None,
        })
        .collect();
    assert!(removed.contains(&(AssetKind::Audio, "orphan.mp3".to_string())));
    assert!(removed.contains(&(AssetKind::Cover, "old.jpg".to_string())));
}

#[tokio::test]
async fn without_cleanup_orphans_are_kept() {
    let h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "orphan.mp3", b"old");

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(report.removed, 0);
    assert!(h.audio_dir().join("orphan.mp3").exists());
}

// ============================================================================
// Integrity gate and idempotence
// ============================================================================

#[tokio::test]
async fn second_run_downloads_nothing_and_writes_identical_descriptor() {
    let h = Harness::new();
    scenario_a(&h.archive);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();
    let first = h.library_json().unwrap();
    let downloads = h.archive.download_count();

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.download_count(), downloads);
    assert_eq!(report.downloaded, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.library_json().unwrap(), first);
}

#[tokio::test]
async fn wrong_size_is_redownloaded() {
    let h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "t.mp3", &AUDIO[..199]);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.downloads_of("t.mp3"), 1);
    assert_eq!(std::fs::read(h.audio_dir().join("t.mp3")).unwrap(), AUDIO);
}

#[tokio::test]
async fn same_size_wrong_hash_is_redownloaded() {
    let h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "t.mp3", &[0x11; 200]);
    h.seed(&h.covers_dir(), "a.jpg", &[0x22; 100]);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(report.downloaded, 2);
    assert_eq!(std::fs::read(h.audio_dir().join("t.mp3")).unwrap(), AUDIO);
    assert_eq!(std::fs::read(h.covers_dir().join("a.jpg")).unwrap(), COVER);
}

#[tokio::test]
async fn unhashable_copy_is_kept_when_failing_open() {
    let tmp_fs: Arc<dyn FileSystemAccess> = Arc::new(UnhashableAudio {
        inner: TokioFileSystem::new(),
    });
    let h = Harness::with_parts(IntegrityConfig::default(), Some(tmp_fs));
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "t.mp3", &[0x11; 200]);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.downloads_of("t.mp3"), 0);
}

#[tokio::test]
async fn unhashable_copy_is_redownloaded_when_failing_closed() {
    let tmp_fs: Arc<dyn FileSystemAccess> = Arc::new(UnhashableAudio {
        inner: TokioFileSystem::new(),
    });
    let integrity = IntegrityConfig {
        policy: FailurePolicy::FailClosed,
        ..IntegrityConfig::default()
    };
    let h = Harness::with_parts(integrity, Some(tmp_fs));
    scenario_a(&h.archive);
    h.seed(&h.audio_dir(), "t.mp3", &[0x11; 200]);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.downloads_of("t.mp3"), 1);
    assert_eq!(std::fs::read(h.audio_dir().join("t.mp3")).unwrap(), AUDIO);
}

#[tokio::test]
async fn track_without_audio_is_listed_but_not_downloaded() {
    let h = Harness::new();
    let mut silent = track("trk_2", None, "x.mp3", AUDIO);
    silent.audio_filename = None;
    silent.audio_url = None;
    let manifest = Manifest::new(NOW_MS, vec![], vec![silent]);
    h.archive.publish(&manifest, &[]);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.download_count(), 0);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].audio_url, "");
    assert!(!report.items[0].is_available_offline());
}

#[tokio::test]
async fn path_like_filenames_are_not_materialized() {
    let h = Harness::new();
    let manifest = Manifest::new(
        NOW_MS,
        vec![],
        vec![track("trk_1", None, "../escape.mp3", AUDIO)],
    );
    h.archive
        .publish(&manifest, &[(&audio_url("../escape.mp3"), AUDIO)]);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(h.archive.download_count(), 0);
    assert_eq!(report.items[0].local_audio_path, None);
    assert!(!h.root().join("escape.mp3").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn cleanup_removes_orphans_with_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let h = Harness::new();
    scenario_a(&h.archive);
    std::fs::create_dir_all(h.audio_dir()).unwrap();
    let orphan = h.audio_dir().join(OsStr::from_bytes(b"orphan\xff.mp3"));
    std::fs::write(&orphan, b"old").unwrap();

    let report = h
        .coordinator
        .synchronize(SyncOptions { cleanup: true })
        .await
        .unwrap();

    assert_eq!(report.removed, 1);
    assert!(!orphan.exists());
    assert!(h.audio_dir().join("t.mp3").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn colon_in_filename_is_downloaded() {
    let h = Harness::new();
    let manifest = Manifest::new(
        NOW_MS,
        vec![],
        vec![track("trk_1", None, "A:intro.mp3", AUDIO)],
    );
    h.archive.publish(&manifest, &[(&audio_url("A:intro.mp3"), AUDIO)]);

    let report = h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(std::fs::read(h.audio_dir().join("A:intro.mp3")).unwrap(), AUDIO);
    assert_eq!(
        h.descriptor().items[0].local_audio_path,
        Some(h.audio_dir().join("A:intro.mp3"))
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn unreachable_manifest_writes_nothing() {
    let mut h = Harness::new();
    h.archive.go_offline();

    let result = h.coordinator.synchronize(SyncOptions::default()).await;

    assert!(matches!(result, Err(SyncError::Transport { .. })));
    assert!(h.library_json().is_none());
    assert!(!h.root().join("version.json").exists());

    let events = h.drain_events();
    assert!(matches!(
        events.last(),
        Some(CoreEvent::Sync(SyncEvent::Failed { .. }))
    ));
}

#[tokio::test]
async fn manifest_fetch_is_retried_per_policy() {
    let tmp = TempDir::new().unwrap();
    let archive = Arc::new(FakeArchive::default());
    let fs = Arc::new(TokioFileSystem::with_data_directory(tmp.path().to_path_buf()));
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay: std::time::Duration::ZERO,
        max_delay: std::time::Duration::ZERO,
        use_exponential_backoff: false,
    };
    let coordinator =
        coordinator_with_retry(&tmp, archive.clone(), fs, IntegrityConfig::default(), retry);

    let result = coordinator.synchronize(SyncOptions::default()).await;

    assert!(matches!(result, Err(SyncError::Transport { .. })));
    assert_eq!(archive.manifest_requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_download_keeps_previous_state() {
    let h = Harness::new();
    scenario_a(&h.archive);
    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();
    let before = h.library_json().unwrap();

    let manifest = Manifest::new(
        NOW_MS,
        vec![album("alb_1", "Clásicos del Vallenato", "a.jpg", COVER)],
        vec![
            track("trk_1", Some("alb_1"), "t.mp3", AUDIO),
            ManifestTrack {
                updated_at: Some(1_700_000_900_000),
                ..track("trk_2", Some("alb_1"), "new.mp3", b"new audio")
            },
        ],
    );
    h.archive.publish(
        &manifest,
        &[(&cover_url("a.jpg"), COVER), (&audio_url("t.mp3"), AUDIO)],
    );
    h.archive.remove_asset(&audio_url("new.mp3"));

    let result = h.coordinator.synchronize(SyncOptions::default()).await;

    assert!(matches!(result, Err(SyncError::Transport { .. })));
    assert_eq!(h.library_json().unwrap(), before);
    assert_eq!(h.coordinator.local_version().await.unwrap(), Some(1_700_000_500_000));
    assert!(!h.audio_dir().join("new.mp3").exists());
}

#[tokio::test]
async fn undecodable_manifest_is_rejected_without_downloads() {
    let tmp = TempDir::new().unwrap();
    let mut http = MockHttp::new();
    http.expect_execute().times(1).returning(|_| {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(b"<html>proxy login</html>"),
        })
    });
    http.expect_download_stream().never();

    let fs = Arc::new(TokioFileSystem::with_data_directory(tmp.path().to_path_buf()));
    let coordinator =
        coordinator_for(&tmp, Arc::new(http), fs, IntegrityConfig::default());

    let result = coordinator.synchronize(SyncOptions::default()).await;

    assert!(matches!(result, Err(SyncError::InvalidManifest(_))));
    assert!(!tmp.path().join("library/library.json").exists());
}

#[tokio::test]
async fn overlapping_sync_fails_fast() {
    let tmp = TempDir::new().unwrap();
    let archive = Arc::new(FakeArchive::default());
    scenario_a(&archive);
    let gate = Arc::new(GatedArchive {
        inner: archive.clone(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let fs = Arc::new(TokioFileSystem::with_data_directory(tmp.path().to_path_buf()));
    let coordinator = Arc::new(coordinator_for(
        &tmp,
        gate.clone(),
        fs,
        IntegrityConfig::default(),
    ));

    let running = coordinator.clone();
    let first = tokio::spawn(async move { running.synchronize(SyncOptions::default()).await });

    gate.entered.notified().await;
    assert!(coordinator.is_syncing());

    let second = coordinator.synchronize(SyncOptions::default()).await;
    assert!(matches!(second, Err(SyncError::SyncInProgress)));

    gate.release.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.items.len(), 1);
    assert!(!coordinator.is_syncing());
}

// ============================================================================
// Events and version probe
// ============================================================================

#[tokio::test]
async fn events_follow_pass_order() {
    let mut h = Harness::new();
    scenario_a(&h.archive);
    h.seed(&h.covers_dir(), "a.jpg", COVER);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    let events = h.drain_events();
    let expected = vec![
        CoreEvent::Sync(SyncEvent::Started { cleanup: false }),
        CoreEvent::Sync(SyncEvent::ManifestFetched {
            version: 1_700_000_500_000,
            albums: 1,
            tracks: 1,
        }),
        CoreEvent::Sync(SyncEvent::AssetSkipped {
            kind: AssetKind::Cover,
            filename: "a.jpg".to_string(),
        }),
        CoreEvent::Sync(SyncEvent::AssetDownloaded {
            kind: AssetKind::Audio,
            filename: "t.mp3".to_string(),
            bytes: 200,
        }),
        CoreEvent::Library(LibraryEvent::DescriptorSaved {
            version: 1_700_000_500_000,
            items: 1,
        }),
    ];
    assert_eq!(&events[..expected.len()], &expected[..]);
    match events.last() {
        Some(CoreEvent::Sync(SyncEvent::Completed {
            items,
            downloaded,
            skipped,
            ..
        })) => {
            assert_eq!((*items, *downloaded, *skipped), (1, 1, 1));
        }
        other => panic!("unexpected last event {:?}", other),
    }
}

#[tokio::test]
async fn version_probe_compares_remote_with_marker() {
    let h = Harness::new();
    scenario_a(&h.archive);

    let fresh = h.coordinator.check_for_update().await.unwrap();
    assert_eq!(fresh.local_version, None);
    assert!(fresh.needs_sync);

    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    let current = h.coordinator.check_for_update().await.unwrap();
    assert_eq!(current.local_version, Some(1_700_000_500_000));
    assert!(!current.needs_sync);
}

#[tokio::test]
async fn sync_if_stale_skips_the_pass_when_current() {
    let h = Harness::new();
    scenario_a(&h.archive);

    let first = h
        .coordinator
        .sync_if_stale(SyncOptions::default())
        .await
        .unwrap();
    assert!(first.is_some());
    let downloads = h.archive.download_count();

    let second = h
        .coordinator
        .sync_if_stale(SyncOptions::default())
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(h.archive.download_count(), downloads);
    // probe + pass, then probe only
    assert_eq!(h.archive.manifest_requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn local_library_accessors() {
    let h = Harness::new();
    assert_eq!(h.coordinator.load_local_library().await.unwrap(), None);
    assert_eq!(h.coordinator.local_version().await.unwrap(), None);

    scenario_a(&h.archive);
    h.coordinator.synchronize(SyncOptions::default()).await.unwrap();

    let library = h.coordinator.load_local_library().await.unwrap().unwrap();
    assert_eq!(library.items.len(), 1);

    let stats = h.coordinator.library_stats().await.unwrap().unwrap();
    assert_eq!((stats.total, stats.synced, stats.pending), (1, 1, 0));
}
