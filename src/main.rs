use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use voicelive_bridge::config::{Config, SearchConfig};
use voicelive_bridge::tools::{AzureSearchBackend, KeywordCatalog, SearchBackend, UserInfo};
use voicelive_bridge::{ClientRegistry, SessionBridge, ToolRegistry, WsConnector, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if config.voicelive.endpoint.is_none() || config.voicelive.api_key.is_none() {
        tracing::warn!("AZURE_VOICELIVE_ENDPOINT or AZURE_VOICELIVE_API_KEY is not set; sessions will fail to start");
    }

    let search = search_backend(config.search.as_ref())?;
    let tools = Arc::new(ToolRegistry::standard(search, UserInfo::default()));
    tracing::info!(tools = tools.len(), "Tool registry ready");

    let bridge = Arc::new(SessionBridge::new(
        Arc::new(ClientRegistry::new()),
        config.voicelive.clone(),
        tools,
        Arc::new(WsConnector),
    ));
    let app = server::router(Arc::clone(&bridge), &config.server.static_dir);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Starting voice bridge server");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    bridge.shutdown().await;
    tracing::info!("Voice bridge server shut down");
    Ok(())
}

#[allow(clippy::result_large_err)]
fn search_backend(config: Option<&SearchConfig>) -> voicelive_bridge::Result<Arc<dyn SearchBackend>> {
    match config {
        Some(search) => {
            tracing::info!(endpoint = %search.endpoint, index = %search.index, "Using Azure AI Search for product lookups");
            Ok(Arc::new(AzureSearchBackend::new(&search.endpoint, &search.index, &search.api_key)?))
        }
        None => {
            tracing::info!("Search index not configured, using the built-in product catalog");
            Ok(Arc::new(KeywordCatalog::default()))
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
