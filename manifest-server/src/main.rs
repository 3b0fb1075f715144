use anyhow::{Context, Result};
use clap::Parser;
use core_runtime::config::FailurePolicy;
use core_runtime::logging::{init_logging, parse_level, LogFormat, LoggingConfig};
use manifest_server::{run_server, ServerConfig, DEFAULT_PORT};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "manifest-server", version, about = "Serve the archive manifest and uploads")]
struct CliArgs {
    /// Directory containing `data/` and `uploads/`.
    #[arg(long, env = "MUSEO_SERVER_ROOT", default_value = ".")]
    root: PathBuf,

    /// Catalog directory. Defaults to `<root>/data`.
    #[arg(long, env = "MUSEO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Upload directory. Defaults to `<root>/uploads`.
    #[arg(long, env = "MUSEO_UPLOADS_DIR")]
    uploads_dir: Option<PathBuf>,

    /// Port to listen on; the next free one is used if it is taken.
    #[arg(long, env = "MUSEO_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "MUSEO_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Base for asset URLs, e.g. `http://192.168.1.20:5050`. Defaults to the request's Host.
    #[arg(long, env = "MUSEO_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// What to serve when a catalog file is unreadable: fail-open (empty) or fail-closed (error).
    #[arg(long, env = "MUSEO_CATALOG_POLICY", default_value = "fail-open")]
    catalog_policy: FailurePolicy,

    #[arg(long, env = "MUSEO_LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,

    #[arg(long, env = "MUSEO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_logging(
        LoggingConfig::default()
            .with_format(args.log_format)
            .with_level(parse_level(&args.log_level)?),
    )?;

    let mut config = ServerConfig::for_root(&args.root);
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.uploads_dir {
        config.uploads_dir = dir;
    }
    config.port = args.port;
    config.bind_address = args.bind;
    config.public_base_url = args.public_base_url;
    config.catalog_policy = args.catalog_policy;

    run_server(config).await.context("Manifest server failed")
}
