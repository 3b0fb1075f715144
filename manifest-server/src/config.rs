//! Server configuration
//!
//! Directory layout follows the admin panel:
//!
//! ```text
//! <root>/data/albums.json
//! <root>/data/tracks.json
//! <root>/uploads/audio/<file>
//! <root>/uploads/covers/<file>
//! ```

use core_runtime::config::FailurePolicy;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use crate::error::{Result, ServerError};

pub const DEFAULT_PORT: u16 = 5050;

/// How many ports above the requested one to try when it is taken.
pub const PORT_SEARCH_LIMIT: u16 = 20;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding `albums.json` and `tracks.json`
    pub data_dir: PathBuf,
    /// Directory holding `audio/` and `covers/`
    pub uploads_dir: PathBuf,
    pub bind_address: IpAddr,
    pub port: u16,
    /// Fixed `scheme://host[:port]` for asset URLs. When unset the base is
    /// taken from each request's `Host` (and `X-Forwarded-Proto`).
    pub public_base_url: Option<String>,
    /// What to publish when a catalog file cannot be read
    pub catalog_policy: FailurePolicy,
}

impl ServerConfig {
    /// Standard `data/` + `uploads/` layout under `root`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            uploads_dir: root.join("uploads"),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            public_base_url: None,
            catalog_policy: FailurePolicy::FailOpen,
        }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.uploads_dir.join("audio")
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.uploads_dir.join("covers")
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(base) = &self.public_base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ServerError::Config(format!(
                    "Public base URL must start with http:// or https://, got '{}'",
                    base
                )));
            }
        }
        if self.port == 0 {
            return Err(ServerError::Config("Port must be greater than 0".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::for_root(".")
    }
}
