//! Typed progress events for the archive sync pipeline, published over
//! `tokio::sync::broadcast`.
//!
//! A sync pass does not take a progress callback. It emits [`SyncEvent`]s on
//! the [`EventBus`] in the order the work happens, and any number of
//! subscribers (a status line, a diagnostics log, a test) consume them
//! independently. Every sync event renders to a one-line status message via
//! [`SyncEvent::message`].
//!
//! ## Ordering
//!
//! For one pass the sequence is: `Started`, `ManifestFetched`, one
//! `AssetSkipped`/`AssetDownloaded` per cover (manifest order), then one per
//! audio file (manifest order), `Library::DescriptorSaved`, zero or more
//! `AssetOrphanRemoved` when cleanup is enabled, and finally `Completed`.
//! A pass that aborts emits `Failed` instead of `Completed`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Sync(_)));
//!
//! tokio::spawn(async move {
//!     while let Ok(CoreEvent::Sync(event)) = stream.recv().await {
//!         println!("{}", event.message());
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: all senders were dropped. Treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError, TryRecvError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// A pass emits one event per asset, so a large archive will overrun a slow
/// subscriber; it then sees `RecvError::Lagged` and keeps going.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync pass progress
    Sync(SyncEvent),
    /// Local library state changes
    Library(LibraryEvent),
}

/// Which asset subdirectory a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Cover,
    Audio,
}

impl AssetKind {
    /// Name of the local subdirectory holding this kind of asset.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Cover => "covers",
            AssetKind::Audio => "audio",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Cover => write!(f, "cover"),
            AssetKind::Audio => write!(f, "audio"),
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by one manifest sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass has acquired the sync guard.
    Started {
        /// Whether orphan cleanup will run after persistence.
        cleanup: bool,
    },
    /// The manifest was fetched and decoded.
    ManifestFetched {
        version: i64,
        albums: usize,
        tracks: usize,
    },
    /// The local copy passed the integrity check; nothing was transferred.
    AssetSkipped { kind: AssetKind, filename: String },
    /// The asset was (re)downloaded.
    AssetDownloaded {
        kind: AssetKind,
        filename: String,
        /// Bytes written to disk.
        bytes: u64,
    },
    /// A local file not referenced by the applied manifest was deleted.
    AssetOrphanRemoved { kind: AssetKind, filename: String },
    /// The pass finished and local state now matches `version`.
    Completed {
        version: i64,
        /// Descriptor items written (one per synced track).
        items: usize,
        downloaded: usize,
        skipped: usize,
        removed: usize,
        duration_ms: u64,
    },
    /// The pass aborted; local state is unchanged.
    Failed {
        /// Human-readable error message.
        message: String,
    },
}

impl SyncEvent {
    /// Status line suitable for a progress label.
    pub fn message(&self) -> String {
        match self {
            SyncEvent::Started { .. } => "Starting sync".to_string(),
            SyncEvent::ManifestFetched {
                version, tracks, ..
            } => format!("Manifest v{} with {} tracks", version, tracks),
            SyncEvent::AssetSkipped { kind, filename } => {
                format!("Up to date {} {}", kind, filename)
            }
            SyncEvent::AssetDownloaded { kind, filename, .. } => {
                format!("Downloading {} {}", kind, filename)
            }
            SyncEvent::AssetOrphanRemoved { kind, filename } => {
                format!("Deleting orphan {} {}", kind, filename)
            }
            SyncEvent::Completed { items, .. } => {
                format!("Sync complete: {} tracks", items)
            }
            SyncEvent::Failed { message } => format!("Sync failed: {}", message),
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the persisted local library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Descriptor and version marker were rewritten.
    DescriptorSaved { version: i64, items: usize },
    /// A persisted file could not be decoded and was treated as absent.
    LoadFailed {
        /// `library.json` or `version.json`.
        file: String,
        message: String,
    },
}

// ============================================================================
// Event Bus
// ============================================================================

/// Fan-out of [`CoreEvent`]s to every current subscriber.
///
/// Cloning the bus clones the sender, so the coordinator, the local state
/// repository and the service façade all publish into the same channel.
/// Events emitted before a subscriber joined are not replayed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// A subscriber more than `capacity` events behind sees `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `event`; returns how many subscribers got it.
    ///
    /// Errors only when nobody is subscribed. Emitters call `.ok()` on the
    /// result since a pass with no listener is normal.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A subscription with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let progress = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events for which `predicate` holds are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |keep| keep(event))
    }

    /// Next matching event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` when `n` events were dropped for this
    /// subscriber (keep receiving), `RecvError::Closed` once every bus clone
    /// is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
