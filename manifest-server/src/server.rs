use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bridge_desktop::TokioFileSystem;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::SystemClock;
use core_library::models::Manifest;
use core_manifest::{JsonCatalogStore, ManifestBuilder, ManifestBuilderConfig};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, PORT_SEARCH_LIMIT};
use crate::error::{Result, ServerError};
use crate::state::ServerState;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Serialize, Debug)]
struct PingResponse {
    ok: bool,
    port: Option<u16>,
}

fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Host (with port, if any) the client used to reach us.
fn request_host(headers: &HeaderMap) -> Option<&str> {
    first_header_value(headers, X_FORWARDED_HOST)
        .or_else(|| first_header_value(headers, header::HOST.as_str()))
}

/// `scheme://host[:port]` that asset URLs are rooted at.
fn base_url(headers: &HeaderMap, state: &ServerState) -> String {
    if let Some(base) = &state.config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let scheme = first_header_value(headers, X_FORWARDED_PROTO).unwrap_or("http");
    match request_host(headers) {
        Some(host) => format!("{}://{}", scheme, host),
        None => format!("{}://localhost:{}", scheme, state.bound_port),
    }
}

fn port_from_host(host: &str) -> Option<u16> {
    // "[::1]:5050" and "10.0.0.5:5050" both end in ":<port>"; "[::1]" does not.
    let (_, port) = host.rsplit_once(':')?;
    if port.ends_with(']') {
        return None;
    }
    port.parse().ok()
}

async fn get_manifest(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Result<Json<Manifest>> {
    let base = base_url(&headers, &state);
    match state.builder.build(&base).await {
        Ok(manifest) => {
            debug!(
                version = manifest.version,
                albums = manifest.albums.len(),
                tracks = manifest.tracks.len(),
                "Served manifest"
            );
            Ok(Json(manifest))
        }
        Err(e) => {
            error!(error = %e, "Failed to build manifest");
            Err(e.into())
        }
    }
}

async fn ping(headers: HeaderMap) -> impl IntoResponse {
    Json(PingResponse {
        ok: true,
        port: request_host(&headers).and_then(port_from_host),
    })
}

async fn log_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}

pub fn make_app(state: ServerState) -> Router {
    let api_routes: Router = Router::new()
        .route("/manifest", get(get_manifest))
        .route("/ping", get(ping))
        .with_state(state.clone());

    Router::new()
        .nest("/api", api_routes)
        .nest_service("/uploads/audio", ServeDir::new(state.config.audio_dir()))
        .nest_service("/uploads/covers", ServeDir::new(state.config.covers_dir()))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_requests))
}

/// Bind `port`, or the first free port among the next [`PORT_SEARCH_LIMIT`].
pub async fn bind_with_fallback(address: IpAddr, port: u16) -> Result<TcpListener> {
    let mut last_error = None;
    for offset in 0..=PORT_SEARCH_LIMIT {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::new(address, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    warn!(requested = port, bound = candidate, "Requested port busy");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(port = candidate, "Port in use");
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(match last_error {
        Some(e) => e.into(),
        None => ServerError::Config(format!("No port available from {}", port)),
    })
}

pub fn make_state(config: ServerConfig) -> ServerState {
    let fs: Arc<dyn FileSystemAccess> =
        Arc::new(TokioFileSystem::with_data_directory(config.data_dir.clone()));
    let catalog = Arc::new(JsonCatalogStore::new(fs.clone(), config.data_dir.clone()));
    let builder_config = ManifestBuilderConfig {
        audio_dir: config.audio_dir(),
        covers_dir: config.covers_dir(),
        catalog_policy: config.catalog_policy,
    };
    let builder = ManifestBuilder::new(catalog, fs, Arc::new(SystemClock), builder_config);
    ServerState::new(config, builder)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate()?;

    for dir in [config.data_dir.clone(), config.audio_dir(), config.covers_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }

    let listener = bind_with_fallback(config.bind_address, config.port).await?;
    let local_addr = listener.local_addr()?;
    info!(
        address = %local_addr,
        data_dir = %config.data_dir.display(),
        uploads_dir = %config.uploads_dir.display(),
        "Manifest server listening"
    );

    let app = make_app(make_state(config).with_bound_port(local_addr.port()));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
