//! HTTP Handlers
//!
//! Ollama-compatible surface. Inference endpoints hand the raw body to the
//! hybrid router and pass its response through; health and stats expose the
//! routing internals for observability.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde_json::{Value, json};

use sollol_core::GatewayError;

use crate::state::AppState;

type HandlerResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Chat completion with automatic pool/sharding routing
pub async fn chat_handler(State(state): State<AppState>, Json(body): Json<Value>) -> HandlerResult {
    require_field(&body, "messages")?;
    route(&state, body).await
}

/// Text generation (non-chat)
pub async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerResult {
    require_field(&body, "prompt")?;
    route(&state, body).await
}

/// Embeddings; always served by the pool
pub async fn embed_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerResult {
    require_field(&body, "input")?;
    route(&state, body).await
}

async fn route(state: &AppState, body: Value) -> HandlerResult {
    state.router.route(body).await.map(Json).map_err(error_response)
}

/// Health of the gateway and both distribution modes
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let mut model_sharding = json!({
        "enabled": state.coordinator.is_some(),
        "coordinator_running": false,
        "rpc_backends": 0,
    });

    if let Some(coordinator) = &state.coordinator {
        let snapshot = coordinator.snapshot().await;
        model_sharding["coordinator_running"] = json!(snapshot.running);
        model_sharding["rpc_backends"] = json!(snapshot.rpc_backend_count);
        if let Some(model) = snapshot.model_loaded {
            model_sharding["model_loaded"] = json!(model);
        }
    }

    Json(json!({
        "status": "healthy",
        "service": "SOLLOL",
        "task_distribution": {
            "enabled": !state.registry.is_empty(),
            "nodes": state.registry.len(),
        },
        "model_sharding": model_sharding,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Comprehensive routing statistics
pub async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "hosts": state.registry.all(),
        "routing_intelligence": {
            "learning": state.learning.snapshot(),
            "health": state.health.stats(),
        },
        "hybrid_routing": state.router.stats().await,
    }))
}

/// Root endpoint with a quick-start guide
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "SOLLOL Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "distribution_modes": {
            "task_distribution": "Load balance requests across Ollama nodes",
            "model_sharding": "Distribute large models via llama.cpp RPC backends",
        },
        "endpoints": {
            "chat": "POST /api/chat",
            "generate": "POST /api/generate",
            "embed": "POST /api/embed",
            "health": "GET /api/health",
            "stats": "GET /api/stats",
        },
        "quick_start": {
            "1_pull_model": "ollama pull llama3.2",
            "2_start_gateway": "RPC_BACKENDS=10.0.0.1:50052,10.0.0.2:50052 sollol-gateway",
            "3_make_request": "curl -X POST localhost:11434/api/chat -d '{\"model\": \"llama3.2\", \"messages\": [{\"role\": \"user\", \"content\": \"Hello!\"}]}'",
        },
    }))
}

fn require_field(body: &Value, field: &str) -> Result<(), (StatusCode, Json<Value>)> {
    if body.get(field).is_none() {
        return Err(error_response(GatewayError::BadRequest(format!(
            "missing '{field}'"
        ))));
    }
    Ok(())
}

/// Map an error into the structured `{error, kind, detail}` body
fn error_response(err: GatewayError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::ModelNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::NoCapacity(_)
        | GatewayError::UpstreamExhausted { .. }
        | GatewayError::CoordinatorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let error = match &err {
        GatewayError::BadRequest(_) => "bad request",
        GatewayError::ModelNotFound(_) => "model not found",
        GatewayError::NoCapacity(_) => "no capacity",
        GatewayError::UpstreamExhausted { .. } => "all upstream attempts failed",
        GatewayError::CoordinatorUnavailable(_) => "coordinator unavailable",
        GatewayError::UpstreamTimeout(_) => "upstream timeout",
        _ => "internal error",
    };

    (
        status,
        Json(json!({
            "error": error,
            "kind": err.kind(),
            "detail": err.to_string(),
        })),
    )
}
