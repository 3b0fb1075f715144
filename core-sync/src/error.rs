use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Manifest or asset fetch failed. The pass is aborted and local state
    /// is left at its previous version.
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl SyncError {
    pub(crate) fn transport(url: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether retrying later may succeed without any local change.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::SyncInProgress)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
