//! Parlance Server
//!
//! Runs the head-to-head WebSocket server and the leaderboard HTTP API
//! side by side until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

use parlance::{
    VERSION,
    game::words::load_words_or_fallback,
    leaderboard::{router, AppState, Leaderboard},
    network::server::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Parlance Server v{}", VERSION);
    info!("WebSocket: {}  HTTP: {}", config.bind_addr, config.http_addr);

    let words = load_words_or_fallback(&config.words_path);
    info!("Word pool: {} words", words.len());

    let board = match &config.leaderboard_path {
        Some(path) => Leaderboard::open(path)
            .with_context(|| format!("Failed to open leaderboard {}", path.display()))?,
        None => {
            warn!("PARLANCE_LEADERBOARD_PATH not set, scores are kept in memory");
            Leaderboard::in_memory()
        }
    };

    let http_listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    let ws_listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    let app = router(AppState::new(board));
    let http = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            error!("HTTP server failed: {}", e);
        }
    });

    let server = Arc::new(GameServer::new(config, words));
    let ws = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(ws_listener).await })
    };

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("Interrupted, shutting down");

    server.shutdown();
    ws.await.context("WebSocket server task panicked")??;
    http.abort();

    Ok(())
}
