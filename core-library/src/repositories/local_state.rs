//! Local state repository trait and implementations

use crate::error::Result;
use crate::models::{LibraryDescriptor, VersionMarker};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const LIBRARY_FILE_NAME: &str = "library.json";
pub const VERSION_FILE_NAME: &str = "version.json";

/// Persistence of the materialized library.
///
/// Both records are replaced wholesale; there is no partial update.
/// A record that was never written loads as `None`.
#[async_trait]
pub trait LocalStateRepository: Send + Sync {
    /// Load the last saved library descriptor
    async fn load_library(&self) -> Result<Option<LibraryDescriptor>>;

    /// Replace the library descriptor
    async fn save_library(&self, descriptor: &LibraryDescriptor) -> Result<()>;

    /// Load the last saved version marker
    async fn load_version(&self) -> Result<Option<VersionMarker>>;

    /// Replace the version marker
    async fn save_version(&self, marker: &VersionMarker) -> Result<()>;

    /// Replace both records at the end of a sync pass.
    ///
    /// The marker must never move ahead of, or be left behind by, the
    /// descriptor; implementations narrow the window where only one of the
    /// two is new as far as their storage allows.
    async fn save_snapshot(
        &self,
        descriptor: &LibraryDescriptor,
        marker: &VersionMarker,
    ) -> Result<()> {
        self.save_library(descriptor).await?;
        self.save_version(marker).await
    }
}

/// JSON files under the library root, written through [`FileSystemAccess`].
///
/// Writes go to `<name>.tmp` and are renamed over the target, so a reader
/// never observes a half-written file. A file that exists but does not
/// decode is logged and treated as absent; the next successful sync
/// overwrites it.
pub struct FileLocalStateRepository {
    fs: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    event_bus: Option<EventBus>,
}

impl FileLocalStateRepository {
    pub fn new(fs: Arc<dyn FileSystemAccess>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            event_bus: None,
        }
    }

    /// Report undecodable files on `event_bus` as [`LibraryEvent::LoadFailed`].
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn library_path(&self) -> PathBuf {
        self.root.join(LIBRARY_FILE_NAME)
    }

    pub fn version_path(&self) -> PathBuf {
        self.root.join(VERSION_FILE_NAME)
    }

    async fn load_json<T: DeserializeOwned>(&self, path: &Path, name: &str) -> Result<Option<T>> {
        if !self.fs.exists(path).await? {
            debug!(file = name, "No local state file yet");
            return Ok(None);
        }

        let raw = match self.fs.read_file(path).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(file = name, error = %e, "Local state file is corrupt; ignoring it");
                if let Some(bus) = &self.event_bus {
                    bus.emit(CoreEvent::Library(LibraryEvent::LoadFailed {
                        file: name.to_string(),
                        message: e.to_string(),
                    }))
                    .ok();
                }
                Ok(None)
            }
        }
    }

    /// Write `value` next to `path` as `<name>.tmp` and return the temp path.
    async fn stage_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(value)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        self.fs.create_dir_all(&self.root).await?;
        self.fs.write_file(&tmp, Bytes::from(body)).await?;
        Ok(tmp)
    }

    async fn save_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = self.stage_json(path, value).await?;
        self.fs.rename(&tmp, path).await?;
        Ok(())
    }

    async fn discard(&self, tmp: &Path) {
        if let Err(e) = self.fs.delete_file(tmp).await {
            if !e.is_not_found() {
                debug!(path = ?tmp, error = %e, "Could not remove staged state file");
            }
        }
    }
}

#[async_trait]
impl LocalStateRepository for FileLocalStateRepository {
    async fn load_library(&self) -> Result<Option<LibraryDescriptor>> {
        self.load_json(&self.library_path(), LIBRARY_FILE_NAME).await
    }

    async fn save_library(&self, descriptor: &LibraryDescriptor) -> Result<()> {
        self.save_json(&self.library_path(), descriptor).await?;
        debug!(
            version = descriptor.version,
            items = descriptor.items.len(),
            "Saved library descriptor"
        );
        Ok(())
    }

    async fn load_version(&self) -> Result<Option<VersionMarker>> {
        self.load_json(&self.version_path(), VERSION_FILE_NAME).await
    }

    async fn save_version(&self, marker: &VersionMarker) -> Result<()> {
        self.save_json(&self.version_path(), marker).await?;
        debug!(version = marker.version, "Saved version marker");
        Ok(())
    }

    /// Stages both files before renaming either, so a failed write leaves
    /// the previous pair untouched.
    async fn save_snapshot(
        &self,
        descriptor: &LibraryDescriptor,
        marker: &VersionMarker,
    ) -> Result<()> {
        let library_tmp = self.stage_json(&self.library_path(), descriptor).await?;
        let version_tmp = match self.stage_json(&self.version_path(), marker).await {
            Ok(tmp) => tmp,
            Err(e) => {
                self.discard(&library_tmp).await;
                return Err(e);
            }
        };

        self.fs.rename(&library_tmp, &self.library_path()).await?;
        self.fs.rename(&version_tmp, &self.version_path()).await?;
        debug!(
            version = marker.version,
            items = descriptor.items.len(),
            "Saved library snapshot"
        );
        Ok(())
    }
}

/// Process-local repository.
#[derive(Default)]
pub struct InMemoryLocalStateRepository {
    library: RwLock<Option<LibraryDescriptor>>,
    version: RwLock<Option<VersionMarker>>,
}

impl InMemoryLocalStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing marker, as if a previous sync had run.
    pub fn with_version(marker: VersionMarker) -> Self {
        Self {
            library: RwLock::new(None),
            version: RwLock::new(Some(marker)),
        }
    }
}

#[async_trait]
impl LocalStateRepository for InMemoryLocalStateRepository {
    async fn load_library(&self) -> Result<Option<LibraryDescriptor>> {
        Ok(self.library.read().await.clone())
    }

    async fn save_library(&self, descriptor: &LibraryDescriptor) -> Result<()> {
        *self.library.write().await = Some(descriptor.clone());
        Ok(())
    }

    async fn load_version(&self) -> Result<Option<VersionMarker>> {
        Ok(*self.version.read().await)
    }

    async fn save_version(&self, marker: &VersionMarker) -> Result<()> {
        *self.version.write().await = Some(*marker);
        Ok(())
    }
}
