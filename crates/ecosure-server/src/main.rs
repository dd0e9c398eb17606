#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use ecosure_assistants::OpenAIAssistants;
use ecosure_server::{AppState, ServerConfig, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ecosure_server=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let config = ServerConfig::load()?;
    config.warn_if_incomplete();

    let assistants = OpenAIAssistants::new(config.api_key.clone().unwrap_or_default())
        .with_base_url(config.base_url.clone());
    let addr = config.bind_addr();
    let app = build_router(AppState::new(config, Arc::new(assistants)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("Failed to bind {}: {}", addr, err))?;

    tracing::info!("ecoSure relay listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
