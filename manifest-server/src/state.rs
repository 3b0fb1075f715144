use core_manifest::ManifestBuilder;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub builder: Arc<ManifestBuilder>,
    /// Port the listener actually got; differs from `config.port` after a
    /// fallback bind.
    pub bound_port: u16,
}

impl ServerState {
    pub fn new(config: ServerConfig, builder: ManifestBuilder) -> Self {
        Self {
            bound_port: config.port,
            config: Arc::new(config),
            builder: Arc::new(builder),
        }
    }

    pub fn with_bound_port(self, bound_port: u16) -> Self {
        Self { bound_port, ..self }
    }
}
