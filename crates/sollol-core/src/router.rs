//! Hybrid Router
//!
//! Top-level routing policy. Small models fan out across the Ollama node
//! pool with scoring-based selection and intelligent failover; models too
//! large for one node go through the llama.cpp coordinator, started on
//! demand for the requested model.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::analyzer::{RequestAnalyzer, TaskContext};
use crate::catalog::ModelCatalog;
use crate::client::{CoordinatorClient, NodeClient};
use crate::coordinator::CoordinatorManager;
use crate::error::{GatewayError, Result};
use crate::health::HealthMonitor;
use crate::learning::LearningStore;
use crate::node::NodePatch;
use crate::payload::InferencePayload;
use crate::registry::NodeRegistry;
use crate::scorer::Scorer;

/// EMA weight for folding completed-request telemetry into node state
const TELEMETRY_EMA_WEIGHT: f64 = 0.9;

/// Router tuning
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Selection attempts per request
    pub max_attempts: u32,

    /// Base backoff between attempts; attempt `i` sleeps `i * backoff`
    pub retry_backoff: Duration,

    /// Inbound request budget
    pub request_timeout: Duration,

    /// Subtracted from the budget for each outbound call
    pub deadline_guard: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(120),
            deadline_guard: Duration::from_secs(2),
        }
    }
}

/// The sharded path: one coordinator manager plus its protocol client
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub manager: Arc<CoordinatorManager>,
    pub client: Arc<dyn CoordinatorClient>,
}

/// Routes requests between the node pool and the coordinator
pub struct HybridRouter {
    registry: Arc<NodeRegistry>,
    catalog: Arc<ModelCatalog>,
    analyzer: RequestAnalyzer,
    scorer: Scorer,
    health: Arc<HealthMonitor>,
    learning: Arc<LearningStore>,
    node_client: Arc<dyn NodeClient>,
    coordinator: Option<CoordinatorHandle>,
    config: RouterConfig,
}

impl HybridRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<NodeRegistry>,
        catalog: Arc<ModelCatalog>,
        health: Arc<HealthMonitor>,
        learning: Arc<LearningStore>,
        node_client: Arc<dyn NodeClient>,
        coordinator: Option<CoordinatorHandle>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            catalog: catalog.clone(),
            analyzer: RequestAnalyzer::new(catalog.clone()),
            scorer: Scorer::new(health.clone(), learning.clone()),
            health,
            learning,
            node_client,
            coordinator,
            config,
        }
    }

    /// Route an inbound request body and return an Ollama-shaped response
    pub async fn route(&self, body: Value) -> Result<Value> {
        let payload = InferencePayload::parse(body)?;
        let ctx = self.analyzer.analyze(&payload);

        // Embeddings always stay on the pool; embedding models are small
        let sharded = !matches!(payload, InferencePayload::Embed { .. })
            && self.catalog.requires_sharding(&ctx.model);

        if sharded {
            if let Some(handle) = &self.coordinator {
                tracing::info!("Routing '{}' to coordinator (model sharding)", ctx.model);
                return self.route_sharded(handle, &payload, &ctx).await;
            }
        }

        tracing::debug!("Routing '{}' to node pool (task distribution)", ctx.model);
        self.route_pool(&payload, &ctx).await
    }

    /// Routing statistics for the stats endpoint
    pub async fn stats(&self) -> Value {
        let coordinator = match &self.coordinator {
            Some(handle) => json!(handle.manager.snapshot().await),
            None => Value::Null,
        };

        json!({
            "distributed_enabled": self.coordinator.is_some(),
            "pool_nodes": self.registry.len(),
            "coordinator": coordinator,
        })
    }

    fn outbound_timeout(&self) -> Duration {
        self.config
            .request_timeout
            .saturating_sub(self.config.deadline_guard)
    }

    async fn route_pool(&self, payload: &InferencePayload, ctx: &TaskContext) -> Result<Value> {
        let mut candidates = self.registry.available();
        let mut last_err: Option<GatewayError> = None;

        for attempt in 1..=self.config.max_attempts {
            let (node, decision) = match self.scorer.select(ctx, &candidates) {
                Ok(selected) => selected,
                // Candidates ran out: NoCapacity if nothing was ever tried,
                // otherwise report the exhausted retries
                Err(e) => {
                    return Err(match last_err {
                        None => e,
                        Some(last) => GatewayError::UpstreamExhausted {
                            attempts: attempt - 1,
                            last: last.to_string(),
                        },
                    });
                }
            };

            tracing::debug!(
                "Attempt {}: {} -> {} ({})",
                attempt,
                ctx.model,
                node.id,
                decision.reasoning
            );

            let started = Instant::now();
            match self
                .node_client
                .execute(&node.id, payload, self.outbound_timeout())
                .await
            {
                Ok(mut response) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

                    self.learning.record(ctx.task_type, &ctx.model, elapsed_ms);
                    self.health.observe(&node.id, elapsed_ms, node.gpu);
                    self.registry.update(
                        &node.id,
                        NodePatch {
                            latency_ms: Some(ema(node.latency_ms, elapsed_ms)),
                            success_rate: Some(ema(node.success_rate, 1.0)),
                            ..Default::default()
                        },
                    );

                    // Embedding responses carry no routing metadata
                    if !matches!(payload, InferencePayload::Embed { .. }) {
                        attach_routing(
                            &mut response,
                            json!({
                                "backend": "pool",
                                "host": node.id.host.clone(),
                                "port": node.id.port,
                                "score": decision.score,
                                "reasoning": decision.reasoning.clone(),
                            }),
                        );
                    }

                    let decision = decision.completed(elapsed_ms);
                    tracing::info!(
                        "{} served by {} in {:.0}ms (score {:.3})",
                        ctx.model,
                        node.id,
                        elapsed_ms,
                        decision.score
                    );
                    return Ok(response);
                }
                // Cancellation is not failure: no marks, no metrics
                Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(e) if e.is_retryable() => {
                    self.registry.mark_unavailable(&node.id, &e.to_string());
                    candidates.retain(|c| c.id != node.id);
                    last_err = Some(e);

                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::UpstreamExhausted {
            attempts: self.config.max_attempts,
            last: last_err.map_or_else(|| "no attempt made".into(), |e| e.to_string()),
        })
    }

    async fn route_sharded(
        &self,
        handle: &CoordinatorHandle,
        payload: &InferencePayload,
        ctx: &TaskContext,
    ) -> Result<Value> {
        handle.manager.ensure(&ctx.model).await?;
        let endpoint = handle.manager.endpoint();

        let raw = handle
            .client
            .forward(&endpoint, payload, self.outbound_timeout())
            .await?;

        let mut response = translate_coordinator_response(payload, &ctx.model, &raw);
        attach_routing(
            &mut response,
            json!({
                "backend": "sharded",
                "coordinator": endpoint,
                "rpc_backend_count": handle.manager.rpc_backend_count(),
            }),
        );

        Ok(response)
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    if previous <= 0.0 {
        sample
    } else {
        previous * TELEMETRY_EMA_WEIGHT + sample * (1.0 - TELEMETRY_EMA_WEIGHT)
    }
}

fn attach_routing(response: &mut Value, routing: Value) {
    if let Some(obj) = response.as_object_mut() {
        obj.insert("_routing".into(), routing);
    }
}

/// Translate a coordinator-dialect response into Ollama shape
fn translate_coordinator_response(payload: &InferencePayload, model: &str, raw: &Value) -> Value {
    let mut response = json!({
        "model": model,
        "created_at": Utc::now().to_rfc3339(),
        "done": true,
        "done_reason": "stop",
    });

    match payload {
        InferencePayload::Chat { .. } => {
            // OpenAI-compatible /v1/chat/completions shape
            let content = raw
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            response["message"] = json!({ "role": "assistant", "content": content });
        }
        InferencePayload::Generate { .. } => {
            // llama.cpp native /completion shape
            let content = raw.get("content").and_then(Value::as_str).unwrap_or_default();
            response["response"] = json!(content);
        }
        InferencePayload::Embed { .. } => {}
    }

    if let Some(usage) = raw.get("usage") {
        response["usage"] = usage.clone();
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NodeProbe;
    use crate::coordinator::{CoordinatorConfig, CoordinatorStatus};
    use crate::node::{Node, NodeId};
    use crate::process::{
        GgufResolver, LaunchSpec, ManagedProcess, ProcessLauncher, RpcBackend,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct MockNodeClient {
        failing_hosts: HashSet<String>,
        cancel_all: std::sync::atomic::AtomicBool,
        calls: Mutex<Vec<NodeId>>,
    }

    impl MockNodeClient {
        fn new(failing_hosts: &[&str]) -> Self {
            Self {
                failing_hosts: failing_hosts.iter().map(ToString::to_string).collect(),
                cancel_all: std::sync::atomic::AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn cancel_everything(&self) {
            self.cancel_all.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<NodeId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NodeClient for MockNodeClient {
        async fn execute(
            &self,
            node: &NodeId,
            payload: &InferencePayload,
            _timeout: Duration,
        ) -> Result<Value> {
            self.calls.lock().unwrap().push(node.clone());
            if self.cancel_all.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(GatewayError::Cancelled);
            }
            if self.failing_hosts.contains(&node.host) {
                return Err(GatewayError::Upstream("500 internal server error".into()));
            }
            Ok(json!({
                "model": payload.model(),
                "message": { "role": "assistant", "content": "hello" },
                "done": true,
            }))
        }

        async fn probe(&self, _node: &NodeId, _timeout: Duration) -> Result<NodeProbe> {
            Ok(NodeProbe { latency_ms: 10.0, ..Default::default() })
        }
    }

    struct NoopProcess;

    #[async_trait]
    impl ManagedProcess for NoopProcess {
        async fn wait_ready(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        async fn terminate(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        async fn kill(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct NoopLauncher;

    #[async_trait]
    impl ProcessLauncher for NoopLauncher {
        async fn launch(&self, _spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>> {
            Ok(Box::new(NoopProcess))
        }
    }

    struct AnyResolver;

    #[async_trait]
    impl GgufResolver for AnyResolver {
        async fn resolve(&self, model: &str) -> Result<Option<PathBuf>> {
            Ok(Some(PathBuf::from(format!("/blobs/{model}"))))
        }
    }

    struct MockCoordinatorClient;

    #[async_trait]
    impl CoordinatorClient for MockCoordinatorClient {
        async fn forward(
            &self,
            _endpoint: &str,
            _payload: &InferencePayload,
            _timeout: Duration,
        ) -> Result<Value> {
            Ok(json!({
                "choices": [{ "message": { "role": "assistant", "content": "sharded reply" } }],
                "usage": { "prompt_tokens": 5, "completion_tokens": 7 },
            }))
        }
    }

    struct Harness {
        router: HybridRouter,
        registry: Arc<NodeRegistry>,
        health: Arc<HealthMonitor>,
        learning: Arc<LearningStore>,
        client: Arc<MockNodeClient>,
        coordinator: Option<Arc<CoordinatorManager>>,
    }

    fn fast_config() -> RouterConfig {
        RouterConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn harness(nodes: Vec<Node>, failing_hosts: &[&str], rpc: Vec<RpcBackend>) -> Harness {
        let registry = Arc::new(NodeRegistry::new());
        for node in nodes {
            registry.insert(node);
        }

        let sharding = !rpc.is_empty();
        let catalog = Arc::new(ModelCatalog::new(sharding));
        let health = Arc::new(HealthMonitor::new());
        let learning = Arc::new(LearningStore::new());
        let client = Arc::new(MockNodeClient::new(failing_hosts));

        let (coordinator, handle) = if sharding {
            let manager = Arc::new(CoordinatorManager::new(
                CoordinatorConfig::new(rpc),
                Arc::new(NoopLauncher),
                Arc::new(AnyResolver),
            ));
            let handle = CoordinatorHandle {
                manager: manager.clone(),
                client: Arc::new(MockCoordinatorClient),
            };
            (Some(manager), Some(handle))
        } else {
            (None, None)
        };

        let router = HybridRouter::new(
            registry.clone(),
            catalog,
            health.clone(),
            learning.clone(),
            client.clone(),
            handle,
            fast_config(),
        );

        Harness { router, registry, health, learning, client, coordinator }
    }

    fn node(host: &str, latency_ms: f64, success_rate: f64) -> Node {
        let mut n = Node::new(NodeId::new(host, 11434));
        n.latency_ms = latency_ms;
        n.success_rate = success_rate;
        n
    }

    fn chat_body(model: &str) -> Value {
        json!({ "model": model, "messages": [{ "role": "user", "content": "hi" }] })
    }

    #[tokio::test]
    async fn test_small_model_chat_routes_to_pool() {
        let h = harness(
            vec![node("a", 120.0, 0.99).with_gpu(8192), node("b", 400.0, 0.90)],
            &[],
            vec![],
        );

        let response = h.router.route(chat_body("llama3.2")).await.unwrap();
        assert_eq!(response["_routing"]["backend"], json!("pool"));
        assert_eq!(response["_routing"]["host"], json!("a"));

        // Success recorded in learning store and health baseline
        assert_eq!(
            h.learning.stats(crate::analyzer::TaskType::Chat, "llama3.2").unwrap().count,
            1
        );
        assert_eq!(h.health.stats().monitored_nodes, 1);
    }

    #[tokio::test]
    async fn test_failover_to_second_node() {
        let h = harness(
            vec![node("a", 50.0, 0.99), node("b", 80.0, 0.99)],
            &["a"],
            vec![],
        );

        let response = h.router.route(chat_body("llama3.2")).await.unwrap();
        assert_eq!(response["_routing"]["host"], json!("b"));

        // A was tried first, marked unavailable, and never retried
        let calls = h.client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].host, "a");
        assert_eq!(calls[1].host, "b");
        assert!(!h.registry.get(&NodeId::new("a", 11434)).unwrap().available);

        // Success recorded against B only; A's baseline untouched
        let stats = h.health.stats();
        assert_eq!(stats.monitored_nodes, 1);
        assert!(stats.baselines.contains_key("b:11434"));
    }

    #[tokio::test]
    async fn test_no_self_retry_and_exhaustion() {
        let h = harness(
            vec![node("a", 50.0, 0.99), node("b", 80.0, 0.99)],
            &["a", "b"],
            vec![],
        );

        let err = h.router.route(chat_body("llama3.2")).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_exhausted");

        // Each node tried exactly once
        let calls = h.client.calls();
        let hosts: HashSet<String> = calls.iter().map(|id| id.host.clone()).collect();
        assert_eq!(calls.len(), hosts.len());

        // Failed attempts never touch the learning store
        assert!(h.learning.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_no_capacity_fails_fast() {
        let h = harness(vec![], &[], vec![]);

        let err = h.router.route(chat_body("llama3.2")).await.unwrap_err();
        assert_eq!(err.kind(), "no_capacity");
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_large_model_routes_to_coordinator() {
        let rpc = vec![RpcBackend::new("10.0.0.1", 50052), RpcBackend::new("10.0.0.2", 50052)];
        let h = harness(vec![node("a", 50.0, 0.99)], &[], rpc);

        let response = h.router.route(chat_body("llama3.1:405b")).await.unwrap();
        assert_eq!(response["_routing"]["backend"], json!("sharded"));
        assert_eq!(response["_routing"]["rpc_backend_count"], json!(2));
        assert_eq!(response["message"]["content"], json!("sharded reply"));
        assert_eq!(response["done"], json!(true));

        let snapshot = h.coordinator.as_ref().unwrap().snapshot().await;
        assert_eq!(
            snapshot.status,
            CoordinatorStatus::Ready { model: "llama3.1:405b".into() }
        );

        // The pool was never involved
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_model_switch_on_coordinator() {
        let rpc = vec![RpcBackend::new("10.0.0.1", 50052)];
        let h = harness(vec![], &[], rpc);

        h.router.route(chat_body("llama3.1:405b")).await.unwrap();
        h.router.route(chat_body("llama2:70b")).await.unwrap();

        let snapshot = h.coordinator.as_ref().unwrap().snapshot().await;
        assert_eq!(snapshot.model_loaded.as_deref(), Some("llama2:70b"));
    }

    #[tokio::test]
    async fn test_embed_stays_on_pool_without_metadata() {
        let rpc = vec![RpcBackend::new("10.0.0.1", 50052)];
        let h = harness(vec![node("a", 50.0, 0.99)], &[], rpc);

        let response = h
            .router
            .route(json!({ "model": "big-embed:405b", "input": "hello" }))
            .await
            .unwrap();
        assert!(response.get("_routing").is_none());
        assert_eq!(h.client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_metric_neutral() {
        let h = harness(vec![node("a", 50.0, 0.99)], &[], vec![]);
        h.client.cancel_everything();

        let err = h.router.route(chat_body("llama3.2")).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");

        // No learning update, no baseline, no availability flip
        assert!(h.learning.snapshot().is_empty());
        assert_eq!(h.health.stats().monitored_nodes, 0);
        assert!(h.registry.get(&NodeId::new("a", 11434)).unwrap().available);
    }

    #[tokio::test]
    async fn test_bad_request() {
        let h = harness(vec![node("a", 50.0, 0.99)], &[], vec![]);
        let err = h.router.route(json!({ "model": "llama3.2" })).await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn test_translate_generate_response() {
        let payload =
            InferencePayload::parse(json!({ "model": "m:405b", "prompt": "hi" })).unwrap();
        let raw = json!({ "content": "once upon a time" });

        let response = translate_coordinator_response(&payload, "m:405b", &raw);
        assert_eq!(response["response"], json!("once upon a time"));
        assert_eq!(response["done_reason"], json!("stop"));
    }
}
