pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod relay;
pub mod validate;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use error::RelayError;
use llm::{ModelProvider, ModelRequest};
use prompt::PromptPolicy;
use relay::Deadline;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared, read-only state for every request.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ModelProvider>,
    pub policy: Arc<PromptPolicy>,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, RelayError> {
    let deadline = Deadline::start(state.request_timeout);

    let messages = validate::parse_request(&body).map_err(RelayError::Invalid)?;
    let profile = state.policy.select(&messages)?;
    info!(
        profile = ?profile.kind,
        messages = messages.len(),
        "relaying chat request"
    );

    let request = ModelRequest {
        system_prompt: profile.system_prompt.clone(),
        temperature: profile.temperature,
        messages,
    };
    let rx = relay::open(state.provider.as_ref(), request, deadline).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (HeaderName::from_static("x-vercel-ai-data-stream"), "v1"),
        ],
        Body::from_stream(relay::forward(rx, deadline)),
    )
        .into_response())
}
