//! Backend Nodes
//!
//! Identity and live telemetry for a single Ollama-protocol endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Identity of one Ollama-protocol endpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Hostname or IP address
    pub host: String,

    /// HTTP port (Ollama default 11434)
    pub port: u16,
}

impl NodeId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Base URL for the node's HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for NodeId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GatewayError::Config("empty node address".into()));
        }
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    GatewayError::Config(format!("invalid port in node address '{s}'"))
                })?;
                Ok(Self::new(host, port))
            }
            // Bare host: assume the standard Ollama port
            None => Ok(Self::new(s, 11434)),
        }
    }
}

/// A backend node with capabilities and live telemetry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Node identity (host, port)
    pub id: NodeId,

    /// Whether a GPU is present on this node
    pub gpu: bool,

    /// Approximate free VRAM in MiB (unknown for CPU-only nodes)
    pub free_vram_mib: Option<u64>,

    /// CPU load in [0, 1]
    pub cpu_load: f64,

    /// Moving-average request latency in milliseconds
    pub latency_ms: f64,

    /// Success rate in [0, 1]
    pub success_rate: f64,

    /// Whether the node is eligible for selection
    pub available: bool,

    /// Operator-assigned priority weight (default 1.0)
    pub priority_weight: f64,

    /// Last telemetry update
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a node with optimistic defaults; telemetry converges via probes
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            gpu: false,
            free_vram_mib: None,
            cpu_load: 0.0,
            latency_ms: 0.0,
            success_rate: 1.0,
            available: true,
            priority_weight: 1.0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_gpu(mut self, free_vram_mib: u64) -> Self {
        self.gpu = true;
        self.free_vram_mib = Some(free_vram_mib);
        self
    }

    pub fn with_priority_weight(mut self, weight: f64) -> Self {
        self.priority_weight = weight;
        self
    }

    /// Apply a telemetry patch, clamping values to their invariants
    pub fn apply(&mut self, patch: NodePatch) {
        if let Some(latency) = patch.latency_ms {
            self.latency_ms = latency.max(0.0);
        }
        if let Some(rate) = patch.success_rate {
            self.success_rate = rate.clamp(0.0, 1.0);
        }
        if let Some(load) = patch.cpu_load {
            self.cpu_load = load.clamp(0.0, 1.0);
        }
        if let Some(vram) = patch.free_vram_mib {
            self.free_vram_mib = Some(vram);
        }
        if let Some(gpu) = patch.gpu {
            self.gpu = gpu;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(weight) = patch.priority_weight {
            self.priority_weight = weight;
        }
        // Timestamps only move forward
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Partial telemetry update merged atomically by the registry
#[derive(Clone, Debug, Default)]
pub struct NodePatch {
    pub latency_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub cpu_load: Option<f64>,
    pub free_vram_mib: Option<u64>,
    pub gpu: Option<bool>,
    pub available: Option<bool>,
    pub priority_weight: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_node_id_parse() {
        let id = NodeId::from_str("10.0.0.5:11435").unwrap();
        assert_eq!(id.host, "10.0.0.5");
        assert_eq!(id.port, 11435);

        // Bare host defaults to the Ollama port
        let id = NodeId::from_str("gpu-box").unwrap();
        assert_eq!(id.port, 11434);

        assert!(NodeId::from_str("").is_err());
        assert!(NodeId::from_str("host:notaport").is_err());
    }

    #[test]
    fn test_patch_clamps_invariants() {
        let mut node = Node::new(NodeId::new("a", 11434));
        node.apply(NodePatch {
            latency_ms: Some(-5.0),
            success_rate: Some(1.7),
            cpu_load: Some(-0.1),
            ..Default::default()
        });
        assert_eq!(node.latency_ms, 0.0);
        assert_eq!(node.success_rate, 1.0);
        assert_eq!(node.cpu_load, 0.0);
    }

    #[test]
    fn test_timestamps_monotonic() {
        let mut node = Node::new(NodeId::new("a", 11434));
        let before = node.updated_at;
        node.apply(NodePatch { latency_ms: Some(10.0), ..Default::default() });
        assert!(node.updated_at >= before);
    }
}
