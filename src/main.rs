use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use llm_gateway::config::{Cli, Config};
use llm_gateway::forwarder::GatewayState;
use llm_gateway::server;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting LLM gateway");
    info!("  Environment: {}", config.env);
    info!("  Listening on: {}", config.http_server.address);
    info!("  Proxying to: {}", config.upstream.base_url);
    info!("  Request timeout: {} seconds", config.upstream.request_timeout_secs);
    info!("  Shutdown grace: {} seconds", config.shutdown_grace_secs);

    let state = GatewayState::from_config(&config).expect("Failed to build HTTP client");
    let force_close = state.shutdown.clone();
    let app = server::router(state, config.cors_permissive);

    let listener = TcpListener::bind(&config.http_server.address)
        .await
        .expect("Failed to bind to address");

    info!("🚀 LLM gateway is ready");

    if let Err(e) = server::serve(
        listener,
        app,
        server::shutdown_signal(),
        config.shutdown_grace(),
        force_close,
    )
    .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server stopped");
}
