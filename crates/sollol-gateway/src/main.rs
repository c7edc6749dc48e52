//! SOLLOL Gateway
//!
//! Drop-in Ollama replacement with two independent distribution modes:
//! task distribution across a pool of Ollama nodes and model sharding
//! through a llama.cpp coordinator. Listens on the standard Ollama port.

mod config;
mod handlers;
mod state;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sollol_core::{
    AdaptiveConfig, AdaptiveLoop, CoordinatorConfig, CoordinatorHandle, CoordinatorManager,
    HealthMonitor, HybridRouter, LearningStore, ModelCatalog, NodeRegistry, RouterConfig,
};
use sollol_runtime::{
    HttpCoordinatorClient, HttpNodeClient, LlamaServerLauncher, OllamaGgufResolver,
};

use crate::config::GatewayConfig;
use crate::handlers::{
    chat_handler, embed_handler, generate_handler, health_handler, root_handler, stats_handler,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(true) => {
            tracing::info!("Interrupted, shutting down");
            ExitCode::from(130)
        }
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Startup failure: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(config: GatewayConfig) -> anyhow::Result<bool> {
    // Node pool for task distribution
    let registry = Arc::new(NodeRegistry::seeded(config.ollama_nodes.clone()));
    if registry.is_empty() {
        tracing::warn!("⚠ No Ollama nodes configured - task distribution disabled");
        tracing::warn!("  Set OLLAMA_NODES=host:port,host:port to enable it");
    } else {
        tracing::info!("✓ Node pool initialized with {} nodes", registry.len());
    }

    let catalog = Arc::new(ModelCatalog::new(config.sharding_enabled()));
    let health = Arc::new(HealthMonitor::new());
    let learning = Arc::new(LearningStore::new());
    let node_client = Arc::new(HttpNodeClient::new());

    // Coordinator for model sharding, when RPC backends are configured
    let coordinator = if config.sharding_enabled() {
        tracing::info!(
            "✓ Model sharding enabled with {} RPC backends",
            config.rpc_backends.len()
        );
        Some(Arc::new(CoordinatorManager::new(
            CoordinatorConfig::new(config.rpc_backends.clone()),
            Arc::new(LlamaServerLauncher::new()),
            Arc::new(OllamaGgufResolver::new()),
        )))
    } else {
        tracing::info!("Model sharding disabled - set RPC_BACKENDS to enable it");
        None
    };

    // Compute-side integrations are external to routing; just surface them
    if config.enable_ray {
        tracing::info!("Ray integration requested (handled by the compute plane)");
    }
    if config.enable_dask {
        tracing::info!("Dask integration requested (handled by the compute plane)");
    }

    let handle = coordinator.as_ref().map(|manager| CoordinatorHandle {
        manager: manager.clone(),
        client: Arc::new(HttpCoordinatorClient::new()),
    });

    let router = Arc::new(HybridRouter::new(
        registry.clone(),
        catalog,
        health.clone(),
        learning.clone(),
        node_client.clone(),
        handle,
        RouterConfig { request_timeout: config.request_timeout, ..Default::default() },
    ));

    // Adaptive loop: periodic probes and learning-sample aging
    let adaptive = AdaptiveLoop::new(
        registry.clone(),
        learning.clone(),
        node_client,
        AdaptiveConfig::default(),
    );
    let cadence = config.adaptive_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cadence);
        loop {
            ticker.tick().await;
            adaptive.tick().await;
        }
    });

    let state = AppState {
        router,
        registry,
        health,
        learning,
        coordinator: coordinator.clone(),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/embed", post(embed_handler))
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server on the standard Ollama port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 SOLLOL gateway running on http://{}", addr);

    let interrupted = Arc::new(AtomicBool::new(false));
    let shutdown_flag = interrupted.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown_flag.store(true, Ordering::SeqCst);
            }
        })
        .await?;

    // Stop the coordinator before exiting
    if let Some(manager) = coordinator {
        manager.shutdown().await;
    }

    Ok(interrupted.load(Ordering::SeqCst))
}
