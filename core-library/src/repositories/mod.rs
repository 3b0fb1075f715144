//! # Repository Pattern Implementation
//!
//! The sync client's local state (library descriptor plus version marker) is
//! accessed through [`LocalStateRepository`] rather than through fixed file
//! paths, so the orchestrator can run against an in-memory fake in tests and
//! a host can relocate the files.
//!
//! - [`FileLocalStateRepository`] - `library.json` / `version.json` under the library root
//! - [`InMemoryLocalStateRepository`] - process-local, for tests and previews

pub mod local_state;

pub use local_state::{
    FileLocalStateRepository, InMemoryLocalStateRepository, LocalStateRepository,
    LIBRARY_FILE_NAME, VERSION_FILE_NAME,
};
