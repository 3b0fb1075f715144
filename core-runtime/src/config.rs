//! # Core Configuration Module
//!
//! Builder-based configuration for the archive sync client.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds the manifest endpoint, where the local library lives,
//! the integrity-check tuning and the injected bridges. The builder fails fast
//! when something required is missing so that a misconfigured kiosk refuses
//! to start instead of failing on the first sync.
//!
//! ## Required
//!
//! - `manifest_url` - absolute `http(s)` URL of `GET /api/manifest`
//! - `HttpClient` - transport (desktop default: reqwest)
//! - `FileSystemAccess` - local library files (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled, the desktop bridges are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, FailurePolicy};
//!
//! let config = CoreConfig::builder()
//!     .manifest_url("http://archive.local:5050/api/manifest")
//!     .library_dir("/var/lib/museo/library")
//!     .integrity_policy(FailurePolicy::FailClosed)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Audio files at or above this size skip the MD5 step of the integrity check.
pub const DEFAULT_AUDIO_HASH_CEILING_BYTES: u64 = 100_000_000;

/// Name of the library directory under the platform data directory.
pub const DEFAULT_LIBRARY_DIR_NAME: &str = "library";

/// What to do when a check cannot reach a verdict because of an I/O error.
///
/// Used by the integrity checker (local file stat/hash failed) and by the
/// manifest builder (record store unreadable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Treat the inconclusive result as success.
    #[default]
    FailOpen,
    /// Treat the inconclusive result as failure.
    FailClosed,
}

impl FailurePolicy {
    pub fn is_fail_open(&self) -> bool {
        matches!(self, FailurePolicy::FailOpen)
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(Self::FailOpen),
            "fail-closed" | "closed" => Ok(Self::FailClosed),
            other => Err(Error::Config(format!(
                "Unknown failure policy '{}', expected fail-open or fail-closed",
                other
            ))),
        }
    }
}

/// Integrity check tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// Audio files with `size >= ceiling` are verified by size only.
    /// `None` hashes every audio file.
    pub audio_hash_ceiling_bytes: Option<u64>,
    /// Same for covers. `None` (the default) always hashes.
    pub cover_hash_ceiling_bytes: Option<u64>,
    /// Verdict when stat or hashing fails on a file that exists.
    pub policy: FailurePolicy,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            audio_hash_ceiling_bytes: Some(DEFAULT_AUDIO_HASH_CEILING_BYTES),
            cover_hash_ceiling_bytes: None,
            policy: FailurePolicy::FailOpen,
        }
    }
}

/// Core configuration for the sync client.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Absolute URL of the manifest endpoint
    pub manifest_url: String,

    /// Library root; `None` resolves to `<data dir>/library` at startup
    pub library_dir: Option<PathBuf>,

    /// Integrity check tuning
    pub integrity: IntegrityConfig,

    /// Per-subscriber event buffer
    pub event_buffer_size: usize,

    /// HTTP client for manifest and asset fetches
    pub http_client: Arc<dyn HttpClient>,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Time source for version markers
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("manifest_url", &self.manifest_url)
            .field("library_dir", &self.library_dir)
            .field("integrity", &self.integrity)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The manifest URL is an absolute http(s) URL
    /// - The library directory, when set, is not empty
    /// - The event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        validate_manifest_url(&self.manifest_url)?;

        if let Some(dir) = &self.library_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Library directory cannot be empty".to_string(),
                ));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_manifest_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid manifest URL '{}': {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "Manifest URL must use http or https, got '{}'",
            other
        ))),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to fetch the manifest and assets. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use ReqwestHttpClient. \
                 Tablet: inject the platform HTTP adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for the local library. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use TokioFileSystem. \
                 Tablet: inject the sandboxed storage adapter."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    manifest_url: Option<String>,
    library_dir: Option<PathBuf>,
    integrity: IntegrityConfig,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the manifest endpoint URL (required).
    pub fn manifest_url(mut self, url: impl Into<String>) -> Self {
        self.manifest_url = Some(url.into());
        self
    }

    /// Sets the library root directory.
    pub fn library_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_dir = Some(path.into());
        self
    }

    /// Sets the audio hash ceiling; `None` hashes every audio file.
    pub fn audio_hash_ceiling(mut self, bytes: Option<u64>) -> Self {
        self.integrity.audio_hash_ceiling_bytes = bytes;
        self
    }

    /// Sets the cover hash ceiling; `None` hashes every cover.
    pub fn cover_hash_ceiling(mut self, bytes: Option<u64>) -> Self {
        self.integrity.cover_hash_ceiling_bytes = bytes;
        self
    }

    /// Sets the verdict for inconclusive integrity checks.
    pub fn integrity_policy(mut self, policy: FailurePolicy) -> Self {
        self.integrity.policy = policy;
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Injects the HTTP client bridge.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Injects the file system bridge.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Injects a clock; defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the configuration, injecting platform defaults where allowed.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the manifest URL is missing or invalid
    /// - [`Error::CapabilityMissing`] if a bridge is missing and no default exists
    pub fn build(self) -> Result<CoreConfig> {
        let manifest_url = self.manifest_url.ok_or_else(|| {
            Error::Config("Manifest URL is required. Use .manifest_url() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            manifest_url,
            library_dir: self.library_dir,
            integrity: self.integrity,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
