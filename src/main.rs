use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use lesson_relay::{
    config::{Cli, Config},
    llm::build_adapter,
    routes::create_router,
    utils::{init_logger, install_panic_hook},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logger(cli.verbose);
    install_panic_hook();

    // Load configuration
    let config = Config::from_env()?.apply_cli(&cli)?;
    info!("Configuration loaded: {:?}", config.server);
    info!("LLM backend: {:?}", config.llm);

    // The adapter is built once and shared read-only by every request
    let llm = build_adapter(&config.llm)?;
    let state = AppState::new(config.clone(), llm);

    // Create router
    let app = create_router(state);

    // Start server
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HOST {}: {}", config.server.host, e))?;
    let addr = SocketAddr::new(host, config.server.port);
    info!(
        %addr,
        provider = %config.llm.provider,
        base_url = %config.llm.base_url,
        default_model = %config.llm.default_model,
        "Server listening"
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
