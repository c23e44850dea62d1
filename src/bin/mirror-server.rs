use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use url::Url;

use mirror::config::Config;
use mirror::metrics::CounterRecorder;
use mirror::oci::{add_mirror_configuration, FsStore};
use mirror::routing::StaticRouter;

#[derive(Parser)]
#[command(
    name = "mirror-server",
    about = "Peer-to-peer pull-through cache for OCI image registries"
)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Content store directory (overrides the configuration)
    #[arg(long)]
    content_dir: Option<PathBuf>,

    /// Listen port (overrides the configuration)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = &args.content_dir {
        config.storage.content_dir = dir.display().to_string();
    }

    // Route the runtime's pulls through this sidecar.
    if let Some(config_path) = &config.registry_config_path {
        let registries = parse_urls(&config.registries)?;
        let mirrors = parse_urls(&config.mirrors)?;
        add_mirror_configuration(Path::new(config_path), &registries, &mirrors, config.resolve_tags)
            .await?;
    }

    let store = Arc::new(FsStore::new(PathBuf::from(&config.storage.content_dir))?);
    let router = Arc::new(StaticRouter::new(config.peers.clone()));
    let metrics = Arc::new(CounterRecorder::new());

    tracing::info!(
        bind_address = %config.server.bind_address,
        port = config.server.port,
        peers = config.peers.len(),
        content_dir = %config.storage.content_dir,
        "starting registry mirror"
    );
    let (_addr, handle) = mirror::start_server(config, store, router, metrics).await?;
    handle.await?;
    Ok(())
}

fn parse_urls(raw: &[String]) -> Result<Vec<Url>, url::ParseError> {
    raw.iter().map(|value| Url::parse(value)).collect()
}
