//! Coordinator Lifecycle
//!
//! Owns at most one running llama.cpp coordinator, keyed by the model it
//! serves. `ensure` guarantees the coordinator is ready for the requested
//! model before the router forwards a sharded request, restarting it on
//! model switch.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{GatewayError, Result};
use crate::process::{GgufResolver, LaunchSpec, ManagedProcess, ProcessLauncher, RpcBackend};

/// Coordinator configuration
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Bind host for the coordinator HTTP API
    pub host: String,

    /// Bind port for the coordinator HTTP API
    pub port: u16,

    /// RPC worker backends for model sharding
    pub rpc_backends: Vec<RpcBackend>,

    /// GPU-layer offload hint passed to the coordinator
    pub gpu_layers: u32,

    /// Context window size passed to the coordinator
    pub ctx_size: u32,

    /// How long to wait for the readiness probe
    pub ready_timeout: Duration,

    /// How long a graceful stop may take before the process is killed
    pub stop_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn new(rpc_backends: Vec<RpcBackend>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            rpc_backends,
            gpu_layers: 99,
            ctx_size: 8192,
            ready_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Coordinator state machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorStatus {
    Idle,
    Starting { model: String },
    Ready { model: String },
    Switching { from: String, to: String },
    Failed,
}

/// Status snapshot for health and stats consumers
#[derive(Clone, Debug, Serialize)]
pub struct CoordinatorSnapshot {
    pub status: CoordinatorStatus,
    pub endpoint: String,
    pub rpc_backend_count: usize,
    pub running: bool,
    pub model_loaded: Option<String>,
}

struct Inner {
    status: CoordinatorStatus,
    process: Option<Box<dyn ManagedProcess>>,
}

/// Manages the single coordinator process
pub struct CoordinatorManager {
    config: CoordinatorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    resolver: Arc<dyn GgufResolver>,
    inner: Mutex<Inner>,
}

impl CoordinatorManager {
    pub fn new(
        config: CoordinatorConfig,
        launcher: Arc<dyn ProcessLauncher>,
        resolver: Arc<dyn GgufResolver>,
    ) -> Self {
        Self {
            config,
            launcher,
            resolver,
            inner: Mutex::new(Inner { status: CoordinatorStatus::Idle, process: None }),
        }
    }

    /// `host:port` the coordinator serves on
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    pub fn rpc_backend_count(&self) -> usize {
        self.config.rpc_backends.len()
    }

    /// Guarantee the coordinator is ready for `model`.
    ///
    /// Holding the mutex across the whole transition means parallel callers
    /// await the in-flight launch instead of queuing duplicates; callers for
    /// the same model then observe `Ready` and return without a second
    /// launch. A `Failed` coordinator retries from scratch on the next call.
    pub async fn ensure(&self, model: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let CoordinatorStatus::Ready { model: active } = &inner.status {
            if active == model {
                return Ok(());
            }
        }

        // Resolve before touching the running coordinator, so a missing
        // model never tears down a healthy one
        let model_path = self.resolver.resolve(model).await?.ok_or_else(|| {
            GatewayError::ModelNotFound(format!(
                "no GGUF for '{model}' in local Ollama storage (try: ollama pull {model})"
            ))
        })?;

        if let Some(mut process) = inner.process.take() {
            if let CoordinatorStatus::Ready { model: from } = inner.status.clone() {
                tracing::info!("Switching coordinator model: {} -> {}", from, model);
                inner.status =
                    CoordinatorStatus::Switching { from, to: model.to_string() };
            }
            if process.terminate(self.config.stop_timeout).await.is_err() {
                process.kill().await.ok();
            }
        }

        inner.status = CoordinatorStatus::Starting { model: model.to_string() };

        let spec = LaunchSpec {
            model_path,
            host: self.config.host.clone(),
            port: self.config.port,
            rpc_backends: self.config.rpc_backends.clone(),
            gpu_layers: self.config.gpu_layers,
            ctx_size: self.config.ctx_size,
        };

        tracing::info!(
            "Starting coordinator for {} on {} with {} RPC backends",
            model,
            spec.endpoint(),
            spec.rpc_backends.len()
        );

        let mut process = match self.launcher.launch(&spec).await {
            Ok(process) => process,
            Err(e) => {
                inner.status = CoordinatorStatus::Failed;
                return Err(GatewayError::CoordinatorUnavailable(format!(
                    "launch failed for {model}: {e}"
                )));
            }
        };

        if let Err(e) = process.wait_ready(self.config.ready_timeout).await {
            process.kill().await.ok();
            inner.status = CoordinatorStatus::Failed;
            return Err(GatewayError::CoordinatorUnavailable(format!(
                "coordinator for {model} did not become ready: {e}"
            )));
        }

        inner.process = Some(process);
        inner.status = CoordinatorStatus::Ready { model: model.to_string() };
        tracing::info!("Coordinator ready for {} on {}", model, self.endpoint());

        Ok(())
    }

    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let inner = self.inner.lock().await;
        let model_loaded = match &inner.status {
            CoordinatorStatus::Ready { model } => Some(model.clone()),
            _ => None,
        };

        CoordinatorSnapshot {
            status: inner.status.clone(),
            endpoint: self.endpoint(),
            rpc_backend_count: self.rpc_backend_count(),
            running: inner.process.is_some(),
            model_loaded,
        }
    }

    /// Stop the coordinator if one is running
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut process) = inner.process.take() {
            if process.terminate(self.config.stop_timeout).await.is_err() {
                process.kill().await.ok();
            }
            tracing::info!("Coordinator stopped");
        }
        inner.status = CoordinatorStatus::Idle;
    }
}
