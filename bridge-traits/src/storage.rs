//! Storage and File System Abstractions
//!
//! The sync core owns one subtree (the library root with its `audio/` and
//! `covers/` subdirectories); the manifest builder reads the server's upload
//! directories. Both go through [`FileSystemAccess`].

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// What the integrity check and the manifest builder need from a stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    /// Last modification, epoch milliseconds. `None` where the platform
    /// cannot report it.
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system seam.
///
/// Missing paths surface as [`BridgeError::Io`](crate::BridgeError::Io) with
/// `NotFound`, so callers can use `is_not_found()` for idempotent deletes.
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn replace(fs: &dyn FileSystemAccess, dest: &Path, body: Bytes) -> Result<()> {
///     let part = dest.with_extension("part");
///     fs.write_file(&part, body).await?;
///     fs.rename(&part, dest).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Host sandbox directory; the library root defaults to `<this>/library`.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Whole-file read. Only used for small JSON state and catalog files;
    /// audio goes through [`open_read_stream`](Self::open_read_stream).
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Create or truncate `path` with `data`.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Move `from` over `to`, replacing it.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Direct children of `path`, full paths, in no particular order.
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    async fn open_read_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;

    /// Create or truncate `path`, creating missing parent directories.
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
}
