//! Node Health Detection
//!
//! Per-node latency baselines and runtime VRAM-exhaustion detection. A GPU
//! node that silently falls back to CPU shows up as a sudden latency spike
//! against its established baseline; the monitor flags it and biases the
//! scorer away until latencies recover.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

use crate::node::NodeId;

/// EMA weight for the established baseline
const BASELINE_EMA_WEIGHT: f64 = 0.9;

/// Absolute latency floor for spike detection, in milliseconds
const EXHAUSTION_FLOOR_MS: f64 = 2000.0;

/// Spike multiplier over baseline that signals exhaustion
const EXHAUSTION_SPIKE_FACTOR: f64 = 4.0;

/// Recovery multiplier: latencies back under this clear the flag
const RECOVERY_FACTOR: f64 = 1.5;

/// Rolling sample window per node
const RECENT_WINDOW: usize = 10;

/// Penalty applied to exhausted nodes, on the scorer's 0-100 scale
const EXHAUSTION_PENALTY: f64 = 100.0;

/// Latency baseline for a single node
#[derive(Clone, Debug, Serialize)]
pub struct NodeBaseline {
    pub baseline_latency_ms: f64,
    pub recent: VecDeque<f64>,
    pub is_gpu: bool,
    pub samples: u64,
    pub exhausted: bool,
}

/// Health-monitor snapshot for the stats endpoint
#[derive(Clone, Debug, Serialize)]
pub struct HealthStats {
    pub monitored_nodes: usize,
    pub degraded_nodes: Vec<String>,
    pub baselines: HashMap<String, BaselineSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BaselineSummary {
    pub baseline_latency_ms: f64,
    pub is_gpu: bool,
    pub samples: u64,
}

/// Detects VRAM exhaustion and emits penalty scores
#[derive(Debug, Default)]
pub struct HealthMonitor {
    baselines: Mutex<HashMap<NodeId, NodeBaseline>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a completed-request latency into the node's baseline.
    ///
    /// Spike detection runs against the baseline established before this
    /// sample: an established baseline `b` with a sample above
    /// `max(4b, 2000ms)` on a GPU node sets the exhaustion flag, and a later
    /// sample under `1.5b` clears it.
    pub fn observe(&self, node: &NodeId, latency_ms: f64, is_gpu: bool) {
        let mut baselines = self.baselines.lock().expect("health lock poisoned");

        let Some(baseline) = baselines.get_mut(node) else {
            baselines.insert(
                node.clone(),
                NodeBaseline {
                    baseline_latency_ms: latency_ms,
                    recent: VecDeque::from([latency_ms]),
                    is_gpu,
                    samples: 1,
                    exhausted: false,
                },
            );
            return;
        };

        baseline.is_gpu = is_gpu;
        let established = baseline.baseline_latency_ms;

        if baseline.is_gpu
            && latency_ms > (established * EXHAUSTION_SPIKE_FACTOR).max(EXHAUSTION_FLOOR_MS)
        {
            if !baseline.exhausted {
                tracing::warn!(
                    "VRAM exhaustion detected on {}: latency jumped {:.0}ms -> {:.0}ms \
                     (likely GPU -> CPU fallback)",
                    node,
                    established,
                    latency_ms
                );
                baseline.exhausted = true;
            }
        } else if baseline.exhausted && latency_ms < established * RECOVERY_FACTOR {
            tracing::info!(
                "{} recovered from VRAM exhaustion (latency {:.0}ms)",
                node,
                latency_ms
            );
            baseline.exhausted = false;
        }

        baseline.baseline_latency_ms =
            established * BASELINE_EMA_WEIGHT + latency_ms * (1.0 - BASELINE_EMA_WEIGHT);
        baseline.recent.push_back(latency_ms);
        if baseline.recent.len() > RECENT_WINDOW {
            baseline.recent.pop_front();
        }
        baseline.samples += 1;
    }

    /// Penalty in [0, 100] subtracted (scaled) from the node's score
    pub fn penalty(&self, node: &NodeId) -> f64 {
        let baselines = self.baselines.lock().expect("health lock poisoned");
        if baselines.get(node).is_some_and(|b| b.exhausted) {
            EXHAUSTION_PENALTY
        } else {
            0.0
        }
    }

    pub fn is_degraded(&self, node: &NodeId) -> bool {
        let baselines = self.baselines.lock().expect("health lock poisoned");
        baselines.get(node).is_some_and(|b| b.exhausted)
    }

    pub fn stats(&self) -> HealthStats {
        let baselines = self.baselines.lock().expect("health lock poisoned");

        HealthStats {
            monitored_nodes: baselines.len(),
            degraded_nodes: baselines
                .iter()
                .filter(|(_, b)| b.exhausted)
                .map(|(id, _)| id.to_string())
                .collect(),
            baselines: baselines
                .iter()
                .map(|(id, b)| {
                    (
                        id.to_string(),
                        BaselineSummary {
                            baseline_latency_ms: b.baseline_latency_ms,
                            is_gpu: b.is_gpu,
                            samples: b.samples,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::new("10.0.0.1", 11434)
    }

    #[test]
    fn test_first_sample_initializes_baseline() {
        let monitor = HealthMonitor::new();
        monitor.observe(&node(), 300.0, true);

        let stats = monitor.stats();
        assert_eq!(stats.monitored_nodes, 1);
        let summary = &stats.baselines[&node().to_string()];
        assert_eq!(summary.baseline_latency_ms, 300.0);
        assert_eq!(summary.samples, 1);
    }

    #[test]
    fn test_exhaustion_detection_and_recovery() {
        let monitor = HealthMonitor::new();
        let id = node();

        // Establish ~300ms baseline
        monitor.observe(&id, 280.0, true);
        monitor.observe(&id, 310.0, true);
        assert_eq!(monitor.penalty(&id), 0.0);

        // 3500ms is above max(4 * baseline, 2000ms): GPU -> CPU fallback
        monitor.observe(&id, 3500.0, true);
        assert!(monitor.is_degraded(&id));
        assert_eq!(monitor.penalty(&id), 100.0);

        // Back to normal latencies clears the flag
        monitor.observe(&id, 320.0, true);
        assert!(!monitor.is_degraded(&id));
        assert_eq!(monitor.penalty(&id), 0.0);
    }

    #[test]
    fn test_cpu_nodes_never_flagged() {
        let monitor = HealthMonitor::new();
        let id = node();

        monitor.observe(&id, 300.0, false);
        monitor.observe(&id, 9000.0, false);
        assert!(!monitor.is_degraded(&id));
    }

    #[test]
    fn test_small_spike_below_floor_ignored() {
        let monitor = HealthMonitor::new();
        let id = node();

        // Baseline 100ms; 450ms is >4x but below the 2000ms floor
        monitor.observe(&id, 100.0, true);
        monitor.observe(&id, 450.0, true);
        assert!(!monitor.is_degraded(&id));
    }

    #[test]
    fn test_window_capped_at_ten() {
        let monitor = HealthMonitor::new();
        let id = node();
        for i in 0..25 {
            monitor.observe(&id, 100.0 + f64::from(i), true);
        }

        let baselines = monitor.baselines.lock().unwrap();
        assert_eq!(baselines[&id].recent.len(), 10);
        assert_eq!(baselines[&id].samples, 25);
    }
}
