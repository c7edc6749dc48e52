//! Node Scoring and Selection
//!
//! Scores every candidate node for a task context and picks the best, with
//! a human-readable reasoning string naming the dominant factors.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::analyzer::TaskContext;
use crate::error::{GatewayError, Result};
use crate::health::HealthMonitor;
use crate::learning::LearningStore;
use crate::node::{Node, NodeId};

const WEIGHT_LATENCY: f64 = 0.30;
const WEIGHT_SUCCESS: f64 = 0.25;
const WEIGHT_LOAD: f64 = 0.15;
const WEIGHT_VRAM: f64 = 0.15;
const WEIGHT_PRIORITY: f64 = 0.10;

/// Bonus for nodes historically fast on this (task, model) pair
const AFFINITY_BONUS: f64 = 0.05;

/// Minimum learning samples before affinity applies
const AFFINITY_MIN_SAMPLES: usize = 5;

/// Requests at or above this priority get boosted scoring and stricter
/// candidate filtering
const HIGH_PRIORITY: u8 = 8;
const HIGH_PRIORITY_MIN_SUCCESS: f64 = 0.9;

/// Scores considered equal within this tolerance fall through to tie-breaks
const SCORE_EPSILON: f64 = 1e-9;

/// Where a request was routed
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Node { id: NodeId },
    Coordinator { endpoint: String },
}

/// Routing decision attached to each request for observability
#[derive(Clone, Debug, Serialize)]
pub struct RoutingDecision {
    pub request_id: Uuid,
    pub target: RouteTarget,
    pub score: f64,
    pub reasoning: String,
    pub context: TaskContext,

    /// Execution duration, filled in on completion
    pub duration_ms: Option<f64>,
}

impl RoutingDecision {
    pub fn completed(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[derive(Clone, Debug)]
struct ScoredNode {
    node: Node,
    score: f64,
    reasoning: String,
}

/// Scoring-based node selector
#[derive(Clone)]
pub struct Scorer {
    health: Arc<HealthMonitor>,
    learning: Arc<LearningStore>,
}

impl Scorer {
    pub fn new(health: Arc<HealthMonitor>, learning: Arc<LearningStore>) -> Self {
        Self { health, learning }
    }

    /// Pick the best node for the context from the candidate snapshot.
    ///
    /// Tie-break: lower latency, then lexicographic (host, port), so a
    /// frozen snapshot always selects the same node.
    pub fn select(&self, ctx: &TaskContext, candidates: &[Node]) -> Result<(Node, RoutingDecision)> {
        let mut scored: Vec<ScoredNode> = candidates
            .iter()
            .filter(|node| node.available)
            .filter(|node| {
                ctx.priority < HIGH_PRIORITY || node.success_rate >= HIGH_PRIORITY_MIN_SUCCESS
            })
            .map(|node| self.score(ctx, node))
            .collect();

        if scored.is_empty() {
            return Err(GatewayError::NoCapacity(format!(
                "no eligible node for {} request (model {})",
                ctx.task_type, ctx.model
            )));
        }

        scored.sort_by(|a, b| {
            if (a.score - b.score).abs() > SCORE_EPSILON {
                return b.score.partial_cmp(&a.score).expect("scores are finite");
            }
            a.node
                .latency_ms
                .partial_cmp(&b.node.latency_ms)
                .expect("latencies are finite")
                .then_with(|| a.node.id.cmp(&b.node.id))
        });

        let best = scored.swap_remove(0);
        let decision = RoutingDecision {
            request_id: Uuid::new_v4(),
            target: RouteTarget::Node { id: best.node.id.clone() },
            score: best.score,
            reasoning: best.reasoning,
            context: ctx.clone(),
            duration_ms: None,
        };

        Ok((best.node, decision))
    }

    fn score(&self, ctx: &TaskContext, node: &Node) -> ScoredNode {
        let latency_score = (1.0 / (1.0 + node.latency_ms / 1000.0)) * WEIGHT_LATENCY;
        let success_score = node.success_rate * WEIGHT_SUCCESS;
        let load_score = (1.0 - node.cpu_load) * WEIGHT_LOAD;

        let vram_score = if ctx.requires_gpu {
            let required_mib = ctx.profile.estimated_memory_gib * 1024.0;
            let free_mib = node.free_vram_mib.unwrap_or(0) as f64;
            if required_mib > 0.0 {
                (free_mib / required_mib).clamp(0.0, 1.0) * WEIGHT_VRAM
            } else {
                WEIGHT_VRAM
            }
        } else {
            WEIGHT_VRAM
        };

        let priority_score = node.priority_weight * WEIGHT_PRIORITY;

        let affinity = self
            .learning
            .stats(ctx.task_type, &ctx.model)
            .filter(|stats| stats.count >= AFFINITY_MIN_SAMPLES)
            .is_some_and(|stats| node.latency_ms <= stats.mean_ms);
        let affinity_score = if affinity { AFFINITY_BONUS } else { 0.0 };

        let penalty = self.health.penalty(&node.id) / 100.0;

        let mut score = latency_score + success_score + load_score + vram_score + priority_score
            + affinity_score
            - penalty;

        // High-priority requests favor proven nodes even harder
        if ctx.priority >= HIGH_PRIORITY {
            score *= 1.0 + f64::from(ctx.priority - HIGH_PRIORITY + 1) * 0.05;
        }

        let mut terms = vec![
            ("latency", latency_score),
            ("success", success_score),
            ("load", load_score),
            ("vram", vram_score),
            ("priority_weight", priority_score),
            ("task_affinity", affinity_score),
        ];
        terms.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("terms are finite"));

        let mut reasoning = format!(
            "top factors: {} {:.3}, {} {:.3}",
            terms[0].0, terms[0].1, terms[1].0, terms[1].1
        );
        if penalty > 0.0 {
            reasoning.push_str("; degraded (VRAM exhaustion penalty)");
        }

        ScoredNode { node: node.clone(), score, reasoning }
    }
}
