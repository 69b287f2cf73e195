use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zdl_gateway::engine::credentials::CredentialStore;
use zdl_gateway::engine::downloader::BookDownloader;
use zdl_gateway::engine::normalizer::TitleNormalizer;
use zdl_gateway::engine::session::SessionManager;
use zdl_gateway::server::handler::{router, AppState};
use zdl_gateway::source::http_source::ZLibraryConnector;
use zdl_gateway::GatewayConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = GatewayConfig::load()?;
    info!(
        "starting gateway auth={} remix={} keep_books={} library={}",
        config.auth,
        config.login_remix,
        config.keep_books,
        config.library_url
    );

    let store = CredentialStore::new(&config.credentials_file, config.auth_mode());
    store
        .ensure_exists()
        .with_context(|| format!("preparing {}", config.credentials_file.display()))?;

    let connector = ZLibraryConnector::new(&config.library_url, config.upstream_timeout())?;
    let session = SessionManager::new(store, Arc::new(connector));
    session.init().await;
    if !session.is_ready() {
        warn!("no catalogue session, book routes fail until POST /credentials succeeds");
    }

    let normalizer = TitleNormalizer::new(
        &config.open_router_api_key,
        &config.open_router_url,
        &config.completion_model,
        config.upstream_timeout(),
    )?;
    if !normalizer.is_configured() {
        info!("title normalization disabled, no completion API configured");
    }
    let downloader = BookDownloader::from_config(&config)?;

    let state = Arc::new(AppState::new(&config, session, downloader, normalizer));
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
