use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use discord_proxy::config::load_config;
use discord_proxy::http::HttpServer;
use discord_proxy::lifecycle::{signals, Shutdown};
use discord_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "discord-proxy", version, about = "Access-controlled gateway for the Discord HTTP API")]
struct Args {
    /// Configuration document (JSON, or TOML with a .toml extension).
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.json")]
    config: PathBuf,

    /// Interface to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "discord-proxy starting");
    tracing::info!(
        config = %args.config.display(),
        upstream = %config.upstream,
        restricted = config.only_roblox_server,
        place_ids = config.place_ids.len(),
        api_keys = config.api_keys.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Checked by validation.
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
