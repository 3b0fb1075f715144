//! # Manifest Server
//!
//! HTTP surface of the archive: serves the manifest built from the admin
//! panel's catalog, plus the uploaded audio and cover files it points at.
//!
//! | Route                     | Response                                 |
//! |---------------------------|------------------------------------------|
//! | `GET /api/manifest`       | [`Manifest`](core_library::models::Manifest) JSON |
//! | `GET /api/ping`           | `{"ok": true, "port": ...}`              |
//! | `GET /uploads/audio/<f>`  | audio file bytes                         |
//! | `GET /uploads/covers/<f>` | cover file bytes                         |

pub mod config;
pub mod error;
mod server;
mod state;

pub use config::{ServerConfig, DEFAULT_PORT, PORT_SEARCH_LIMIT};
pub use error::{Result, ServerError};
pub use server::{bind_with_fallback, make_app, make_state, run_server};
pub use state::ServerState;
