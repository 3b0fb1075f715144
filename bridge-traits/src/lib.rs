//! # Host Bridge Traits
//!
//! Platform abstraction traits consumed by the archive sync core.
//!
//! ## Overview
//!
//! The sync core never talks to the network or the disk directly. Every
//! capability it needs is expressed as a trait here and injected by the host,
//! which keeps the orchestrator testable with in-memory fakes and lets a
//! kiosk build swap in its own transport.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Manifest fetch and asset streaming
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Local library files
//! - [`Clock`](time::Clock) - Time source for version markers and manifests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop / kiosk | `bridge-desktop` |
//! | Tablet app | host-provided |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided. \
//!                  Desktop: enable the desktop-shims feature. \
//!                  Tablet: inject the platform adapter.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the original message.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{is_retryable_status, HttpClient, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
