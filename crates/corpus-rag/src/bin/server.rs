//! Engine HTTP server

use tracing_subscriber::EnvFilter;

use corpus_rag::server::{router, AppState};
use corpus_rag::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("CORPUS_RAG_CONFIG").unwrap_or_else(|_| "corpus-rag.toml".to_string());
    let config = EngineConfig::load_or_default(&config_path)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config).await?;
    let app = router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
