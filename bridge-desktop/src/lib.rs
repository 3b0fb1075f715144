//! Host adapters for desktop and kiosk machines.
//!
//! [`ReqwestHttpClient`] fetches the manifest and streams assets;
//! [`TokioFileSystem`] keeps the library under the platform data directory.
//! `CoreConfig::builder()` falls back to both when the `desktop-shims`
//! feature is on and the host injects nothing.
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .manifest_url("http://10.0.0.5:5050/api/manifest")
//!     .http_client(Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(15))))
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .build()?;
//! ```

mod filesystem;
mod http;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
