use thiserror::Error;

/// Everything the façade can fail with, one variant per layer underneath.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid core configuration: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Host bridge failed: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error(transparent)]
    Sync(#[from] core_sync::SyncError),

    #[error(transparent)]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// Whether a later attempt may succeed without any local change.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Sync(e) => e.is_transient(),
            CoreError::Bridge(e) => e.is_transient(),
            CoreError::Config(_) | CoreError::Library(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
