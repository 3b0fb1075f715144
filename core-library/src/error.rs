use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Failures reading or writing local library state.
///
/// A corrupt state file is not an error here: loads treat it as absent.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Local state I/O failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Could not encode local state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
