use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Catalog {collection} unavailable: {message}")]
    CatalogUnavailable { collection: String, message: String },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
