//! Adaptive Loop
//!
//! Periodic maintenance: probe every node's health endpoint, fold the
//! results into registry telemetry, flip availability, and age out stale
//! learning samples. The gateway drives `tick` on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use crate::client::NodeClient;
use crate::learning::LearningStore;
use crate::node::NodePatch;
use crate::registry::NodeRegistry;

/// EMA weight for probe-derived telemetry
const PROBE_EMA_WEIGHT: f64 = 0.9;

/// Adaptive loop tuning
#[derive(Clone, Debug)]
pub struct AdaptiveConfig {
    /// Bound on each health probe
    pub probe_timeout: Duration,

    /// Learning samples older than this are dropped
    pub learning_horizon: chrono::Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            learning_horizon: chrono::Duration::hours(1),
        }
    }
}

/// Periodic prober and telemetry maintainer
pub struct AdaptiveLoop {
    registry: Arc<NodeRegistry>,
    learning: Arc<LearningStore>,
    client: Arc<dyn NodeClient>,
    config: AdaptiveConfig,
}

impl AdaptiveLoop {
    pub fn new(
        registry: Arc<NodeRegistry>,
        learning: Arc<LearningStore>,
        client: Arc<dyn NodeClient>,
        config: AdaptiveConfig,
    ) -> Self {
        Self { registry, learning, client, config }
    }

    /// One maintenance pass: probe all nodes concurrently, then prune
    pub async fn tick(&self) {
        let nodes = self.registry.all();

        let probes = nodes.iter().map(|node| {
            let client = self.client.clone();
            let id = node.id.clone();
            let timeout = self.config.probe_timeout;
            async move { (id.clone(), client.probe(&id, timeout).await) }
        });

        for (id, outcome) in futures::future::join_all(probes).await {
            let Some(node) = self.registry.get(&id) else { continue };

            match outcome {
                Ok(probe) => {
                    self.registry.update(
                        &id,
                        NodePatch {
                            latency_ms: Some(ema(node.latency_ms, probe.latency_ms)),
                            success_rate: Some(ema(node.success_rate, 1.0)),
                            cpu_load: probe.cpu_load,
                            free_vram_mib: probe.free_vram_mib,
                            ..Default::default()
                        },
                    );
                    // One successful probe restores an unavailable node
                    self.registry.mark_available(&id);
                }
                Err(e) => {
                    self.registry.update(
                        &id,
                        NodePatch {
                            success_rate: Some(ema(node.success_rate, 0.0)),
                            ..Default::default()
                        },
                    );
                    self.registry.mark_unavailable(&id, &format!("probe failed: {e}"));
                }
            }
        }

        self.learning.prune_older_than(self.config.learning_horizon);
    }
}

fn ema(previous: f64, sample: f64) -> f64 {
    if previous <= 0.0 && sample > 0.0 {
        sample
    } else {
        previous * PROBE_EMA_WEIGHT + sample * (1.0 - PROBE_EMA_WEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TaskType;
    use crate::client::NodeProbe;
    use crate::error::{GatewayError, Result};
    use crate::node::{Node, NodeId};
    use crate::payload::InferencePayload;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct MockProber {
        down_hosts: Mutex<HashSet<String>>,
    }

    impl MockProber {
        fn new(down: &[&str]) -> Self {
            Self {
                down_hosts: Mutex::new(down.iter().map(ToString::to_string).collect()),
            }
        }

        fn set_down(&self, host: &str, down: bool) {
            let mut hosts = self.down_hosts.lock().unwrap();
            if down {
                hosts.insert(host.to_string());
            } else {
                hosts.remove(host);
            }
        }
    }

    #[async_trait]
    impl NodeClient for MockProber {
        async fn execute(
            &self,
            _node: &NodeId,
            _payload: &InferencePayload,
            _timeout: Duration,
        ) -> Result<Value> {
            unreachable!("adaptive loop only probes")
        }

        async fn probe(&self, node: &NodeId, _timeout: Duration) -> Result<NodeProbe> {
            if self.down_hosts.lock().unwrap().contains(&node.host) {
                return Err(GatewayError::Upstream("connection refused".into()));
            }
            Ok(NodeProbe {
                latency_ms: 40.0,
                cpu_load: Some(0.25),
                free_vram_mib: Some(4096),
            })
        }
    }

    fn setup(down: &[&str]) -> (AdaptiveLoop, Arc<NodeRegistry>, Arc<LearningStore>, Arc<MockProber>) {
        let registry = Arc::new(NodeRegistry::new());
        registry.insert(Node::new(NodeId::new("a", 11434)));
        registry.insert(Node::new(NodeId::new("b", 11434)));

        let learning = Arc::new(LearningStore::new());
        let client = Arc::new(MockProber::new(down));
        let adaptive = AdaptiveLoop::new(
            registry.clone(),
            learning.clone(),
            client.clone(),
            AdaptiveConfig::default(),
        );
        (adaptive, registry, learning, client)
    }

    #[tokio::test]
    async fn test_probe_updates_telemetry() {
        let (adaptive, registry, _, _) = setup(&[]);
        adaptive.tick().await;

        let node = registry.get(&NodeId::new("a", 11434)).unwrap();
        assert_eq!(node.latency_ms, 40.0);
        assert_eq!(node.cpu_load, 0.25);
        assert_eq!(node.free_vram_mib, Some(4096));
        assert!(node.available);
    }

    #[tokio::test]
    async fn test_failed_probe_demotes_then_recovers() {
        let (adaptive, registry, _, client) = setup(&["b"]);

        adaptive.tick().await;
        let b = NodeId::new("b", 11434);
        assert!(!registry.get(&b).unwrap().available);
        assert!(registry.get(&b).unwrap().success_rate < 1.0);

        // One successful probe restores eligibility
        client.set_down("b", false);
        adaptive.tick().await;
        assert!(registry.get(&b).unwrap().available);
    }

    #[tokio::test]
    async fn test_stale_learning_samples_pruned() {
        let (mut adaptive, _, learning, _) = setup(&[]);
        adaptive.config.learning_horizon = chrono::Duration::zero();

        learning.record(TaskType::Chat, "llama3.2", 120.0);
        adaptive.tick().await;
        assert!(learning.stats(TaskType::Chat, "llama3.2").is_none());
    }
}
