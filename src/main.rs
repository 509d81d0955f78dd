//! Playpen CLI entry point.
//!
//! Wires the toolchain, storage, bundle store and sandbox into a playground,
//! follows it with a preview, and serves both over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use playpen_common::config_file::ConfigFile;
use playpen_core::{WasmEngine, WasmSandboxFactory, WatToolchain};
use playpen_host::{FileStorage, HttpBundleStore, MemoryStorage, Storage, create_instance_runner};
use playpen_pipeline::{Playground, Preview};
use playpen_server::{AppState, PlaypenServer, ServerConfig};

/// Live-rebuilding WebAssembly playground.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "PLAYPEN_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file.
    #[arg(short, long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Share URL whose fragment holds the pen to open.
    #[arg(long)]
    pen_url: Option<Url>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PLAYPEN_JSON_LOGS")]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,playpen=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting playpen");

    let mut config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    let server_config = ServerConfig::from_file(&config.server)
        .context("Invalid server configuration. Expected bind address 'host:port'")?;

    let engine = WasmEngine::new(&config.sandbox.engine).context("Failed to create engine")?;
    let _epoch_ticker = engine.spawn_epoch_ticker();

    let storage: Arc<dyn Storage> = match &config.storage.dir {
        Some(dir) => Arc::new(
            FileStorage::open(dir).with_context(|| format!("Failed to open storage at {dir}"))?,
        ),
        None => {
            warn!("No storage directory configured; pens are kept in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let bundle_store = HttpBundleStore::new(
        config.remote.admin_token.clone(),
        Duration::from_secs(config.remote.upload_timeout_secs),
    )
    .context("Failed to create bundle store client")?;

    let runner = Arc::new(create_instance_runner(&engine).context("Failed to register host functions")?);
    let factory = Arc::new(WasmSandboxFactory::new(
        runner,
        config.sandbox.execution.clone(),
    ));

    let playground = Arc::new(
        Playground::new(
            Arc::new(WatToolchain::new(engine)),
            storage,
            Some(Arc::new(bundle_store)),
            config.pipeline.clone(),
        )
        .context("Failed to create playground")?,
    );
    let origin = playground.load(args.pen_url.as_ref());
    info!(origin = ?origin, name = %playground.pen().name, "Playground ready");

    let preview = Preview::new(factory, playground.error_sink());
    tokio::spawn({
        let preview = preview.clone();
        let bundles = playground.subscribe();
        let settings = playground.subscribe_settings();
        async move { preview.run(bundles, settings).await }
    });

    info!(bind_addr = %server_config.bind_addr, "Configuration loaded");
    info!("Available endpoints:");
    info!("  GET    /health               - Health check");
    info!("  GET    /pen                  - Current pen");
    info!("  PUT    /pen/source           - Replace source");
    info!("  PUT    /pen/name             - Rename pen");
    info!("  POST   /pen/rebuild          - Rebuild now");
    info!("  GET    /share                - Share URL");
    info!("  GET    /diagnostics          - Compile and preview errors");
    info!("  GET    /settings             - Settings (PATCH to update)");
    info!("  GET    /bundle               - Current bundle");
    info!("  GET    /preview              - Rendered preview");
    info!("  POST   /preview/reset        - Reload preview");

    let server = PlaypenServer::new(AppState::new(playground, preview), server_config);
    server.run().await?;

    Ok(())
}
