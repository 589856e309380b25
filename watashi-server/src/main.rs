use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use watashi_server::{config::Config, llm::LlmService, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    let policy = config.prompt_policy()?;

    let llm_service = LlmService::new(
        config.api_key.clone(),
        config.api_base.clone(),
        config.model.clone(),
        config.max_tokens,
    );
    info!("Using model: {}", llm_service.model());
    info!(
        "Prompt policy: {:?}, keywords: {:?}, timeout: {:?}",
        config.policy,
        config.keywords.as_slice(),
        config.request_timeout
    );

    let app = router(AppState {
        provider: Arc::new(llm_service),
        policy: Arc::new(policy),
        request_timeout: config.request_timeout,
    });

    info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
