//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the archive sync client:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus carrying typed sync progress

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
