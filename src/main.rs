use anyhow::Context;
use claude_gateway::{build_router, AppState, Gateway, GatewayConfig, HttpTransport, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "claude-gateway",
    about = "Serve the Anthropic Messages API on top of Azure OpenAI deployments",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Never use the unified router
    #[arg(long)]
    no_router: bool,

    /// Audit log file path
    #[arg(long, default_value = "claude-gateway.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claude_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in claude_gateway::config::config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.base_url {
        config.backend.base_url = Some(url);
    }
    if cli.no_router {
        config.router.enabled = false;
    }

    let logger = SharedLogger::new(&cli.log_file)
        .with_context(|| format!("opening log file {}", cli.log_file.display()))?;
    // Reloading keeps only the newest entries; drop the rest from disk too
    if let Err(e) = logger.compact() {
        warn!("Could not compact {}: {e}", cli.log_file.display());
    }
    let transport = HttpTransport::from_config(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = config.backend.base_url.as_deref().unwrap_or("(not set)"),
        router = config.router.enabled,
        big = %config.router.big_model,
        small = %config.router.small_model,
        mapped_models = config.models.len(),
        log_file = %cli.log_file.display(),
        "claude-gateway starting"
    );
    if config.backend.base_url.is_none() {
        warn!("No backend base URL configured; requests will fail until one is set");
    }

    logger.info(
        "startup",
        format!(
            "Starting claude-gateway base_url={} router={} port={}",
            config.backend.base_url.as_deref().unwrap_or("-"),
            config.router.enabled,
            config.port
        ),
    );

    let port = config.port;
    let gateway = Gateway::new(config, Arc::new(transport), logger.clone());
    let state = Arc::new(AppState {
        gateway: Arc::new(gateway),
        logger,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{bind_addr} (point ANTHROPIC_BASE_URL at http://localhost:{port})");

    axum::serve(listener, app).await?;

    Ok(())
}
