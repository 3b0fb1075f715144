//! # Integrity Checker
//!
//! Decides whether a local asset copy can be kept or must be fetched again.
//!
//! Checks run cheapest first and stop at the first definite answer:
//!
//! 1. the file must exist
//! 2. its size must equal the advertised size, when one is advertised
//! 3. its MD5 must equal the advertised digest, when one is advertised and
//!    the file is below the hash ceiling for its kind
//!
//! A stat or hash that fails on a file that does exist gives no answer at
//! all; [`FailurePolicy`] decides what that means.

use bridge_traits::storage::FileSystemAccess;
use core_library::checksum::{digests_match, md5_hex_stream};
use core_runtime::config::{FailurePolicy, IntegrityConfig};
use core_runtime::events::AssetKind;
use core_runtime::logging::strip_path;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of checking one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityVerdict {
    /// Every check that ran passed. `hashed` is false when the digest step
    /// was skipped (no digest advertised, or file above the ceiling).
    Valid { hashed: bool },
    Missing,
    SizeMismatch { expected: u64, actual: u64 },
    HashMismatch { expected: String, actual: String },
    /// Stat or hash failed on an existing file.
    Inconclusive { reason: String },
}

impl IntegrityVerdict {
    /// Whether the local copy may be kept under `policy`.
    pub fn is_valid(&self, policy: FailurePolicy) -> bool {
        match self {
            IntegrityVerdict::Valid { .. } => true,
            IntegrityVerdict::Inconclusive { .. } => policy.is_fail_open(),
            _ => false,
        }
    }
}

/// What the manifest says a file should look like.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedAsset<'a> {
    pub kind: AssetKind,
    pub size: Option<u64>,
    pub md5: Option<&'a str>,
}

pub struct IntegrityChecker {
    fs: Arc<dyn FileSystemAccess>,
    config: IntegrityConfig,
}

impl IntegrityChecker {
    pub fn new(fs: Arc<dyn FileSystemAccess>, config: IntegrityConfig) -> Self {
        Self { fs, config }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.config.policy
    }

    /// Run the checks against `path` and report why it passed or failed.
    pub async fn verify(&self, path: &Path, expected: ExpectedAsset<'_>) -> IntegrityVerdict {
        let display = path.to_string_lossy();
        let file = strip_path(&display);

        // An exists() failure is treated like absence: re-downloading is
        // the only way to end up with a path the descriptor can trust.
        match self.fs.exists(path).await {
            Ok(true) => {}
            Ok(false) => return IntegrityVerdict::Missing,
            Err(e) => {
                warn!(file, error = %e, "Could not check for local copy");
                return IntegrityVerdict::Missing;
            }
        }

        let actual_size = match self.fs.metadata(path).await {
            Ok(metadata) => metadata.size,
            Err(e) => {
                warn!(file, error = %e, "Could not stat local copy");
                return IntegrityVerdict::Inconclusive {
                    reason: e.to_string(),
                };
            }
        };

        if let Some(expected_size) = expected.size {
            if expected_size != actual_size {
                return IntegrityVerdict::SizeMismatch {
                    expected: expected_size,
                    actual: actual_size,
                };
            }
        }

        let Some(expected_md5) = expected.md5.filter(|d| !d.trim().is_empty()) else {
            return IntegrityVerdict::Valid { hashed: false };
        };

        if !self.should_hash(expected.kind, actual_size) {
            debug!(
                file,
                size = actual_size,
                "Above hash ceiling; trusting size"
            );
            return IntegrityVerdict::Valid { hashed: false };
        }

        let actual_md5 = match self.fs.open_read_stream(path).await {
            Ok(mut reader) => match md5_hex_stream(&mut reader).await {
                Ok((digest, _)) => digest,
                Err(e) => {
                    warn!(file, error = %e, "Could not hash local copy");
                    return IntegrityVerdict::Inconclusive {
                        reason: e.to_string(),
                    };
                }
            },
            Err(e) => {
                warn!(file, error = %e, "Could not open local copy");
                return IntegrityVerdict::Inconclusive {
                    reason: e.to_string(),
                };
            }
        };

        if digests_match(expected_md5, &actual_md5) {
            IntegrityVerdict::Valid { hashed: true }
        } else {
            IntegrityVerdict::HashMismatch {
                expected: expected_md5.to_string(),
                actual: actual_md5,
            }
        }
    }

    /// `true` when the local copy can be kept.
    pub async fn is_local_copy_valid(&self, path: &Path, expected: ExpectedAsset<'_>) -> bool {
        self.verify(path, expected).await.is_valid(self.config.policy)
    }

    fn should_hash(&self, kind: AssetKind, size: u64) -> bool {
        let ceiling = match kind {
            AssetKind::Audio => self.config.audio_hash_ceiling_bytes,
            AssetKind::Cover => self.config.cover_hash_ceiling_bytes,
        };
        ceiling.map_or(true, |ceiling| size < ceiling)
    }
}
