//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! clock) and a validated [`CoreConfig`] into the sync core. Desktop hosts
//! enable the `desktop-shims` feature (the default), which lets the config
//! builder fall back to `bridge-desktop`; tablet hosts inject their own
//! adapters.
//!
//! The façade also carries the caller side of the update protocol: probe the
//! manifest version first ([`CoreService::check_for_update`]) and only run the
//! expensive pass when the remote version is newer
//! ([`CoreService::sync_if_stale`]).

pub mod error;

pub use error::{CoreError, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_library::{
    FileLocalStateRepository, LibraryDescriptor, LibraryStats, LocalStateRepository,
};
use core_runtime::config::{CoreConfig, DEFAULT_LIBRARY_DIR_NAME};
use core_runtime::events::{EventBus, EventStream};
use core_sync::{SyncConfig, SyncCoordinator, SyncOptions, SyncReport, UpdateCheck};
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    library_root: PathBuf,
    event_bus: EventBus,
    coordinator: Arc<SyncCoordinator>,
}

impl CoreService {
    /// Validate `config`, resolve the library root and wire the coordinator.
    ///
    /// The library root is `config.library_dir` when set, otherwise
    /// `<data dir>/library` as reported by the file system bridge.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let library_root = match &config.library_dir {
            Some(dir) => dir.clone(),
            None => config
                .file_system
                .get_data_directory()
                .await?
                .join(DEFAULT_LIBRARY_DIR_NAME),
        };

        let event_bus = EventBus::new(config.event_buffer_size);
        let state: Arc<dyn LocalStateRepository> = Arc::new(
            FileLocalStateRepository::new(config.file_system.clone(), library_root.clone())
                .with_event_bus(event_bus.clone()),
        );

        let sync_config = SyncConfig::new(config.manifest_url.clone(), library_root.clone())
            .with_integrity(config.integrity);
        let coordinator = Arc::new(SyncCoordinator::new(
            sync_config,
            config.http_client.clone(),
            config.file_system.clone(),
            state,
            config.clock.clone(),
            event_bus.clone(),
        ));

        info!(
            manifest_url = %core_runtime::logging::redact_url(&config.manifest_url),
            library_root = %library_root.display(),
            "Core service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            library_root,
            event_bus,
            coordinator,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Directory holding `library.json`, `version.json`, `audio/` and `covers/`.
    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Subscribe to sync and library events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Run a full sync pass regardless of the local version.
    pub async fn synchronize(&self, options: SyncOptions) -> Result<SyncReport> {
        Ok(self.coordinator.synchronize(options).await?)
    }

    /// Compare the remote manifest version with the local marker.
    pub async fn check_for_update(&self) -> Result<UpdateCheck> {
        Ok(self.coordinator.check_for_update().await?)
    }

    /// Sync only when the remote manifest is newer than the local marker.
    pub async fn sync_if_stale(&self, options: SyncOptions) -> Result<Option<SyncReport>> {
        Ok(self.coordinator.sync_if_stale(options).await?)
    }

    pub async fn load_local_library(&self) -> Result<Option<LibraryDescriptor>> {
        Ok(self.coordinator.load_local_library().await?)
    }

    pub async fn local_version(&self) -> Result<Option<i64>> {
        Ok(self.coordinator.local_version().await?)
    }

    pub async fn library_stats(&self) -> Result<Option<LibraryStats>> {
        Ok(self.coordinator.library_stats().await?)
    }

    pub fn is_syncing(&self) -> bool {
        self.coordinator.is_syncing()
    }
}
