use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// True when the same request may succeed if simply tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::NotAvailable(_) => false,
            BridgeError::OperationFailed(_) | BridgeError::Io(_) => true,
            BridgeError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
