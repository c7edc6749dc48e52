//! Upstream Client Seams
//!
//! The routing core never speaks HTTP itself. These traits are implemented
//! by the runtime crate (reqwest) and by in-memory mocks in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::node::NodeId;
use crate::payload::InferencePayload;

/// Telemetry returned by a node health probe
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeProbe {
    /// Round-trip latency of the probe in milliseconds
    pub latency_ms: f64,

    /// CPU load in [0, 1], when the node reports it
    pub cpu_load: Option<f64>,

    /// Free VRAM in MiB, when the node reports it
    pub free_vram_mib: Option<u64>,
}

/// Client for Ollama-protocol pool nodes
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Forward an inference payload to the node and return its raw response
    async fn execute(
        &self,
        node: &NodeId,
        payload: &InferencePayload,
        timeout: Duration,
    ) -> Result<Value>;

    /// Ping the node's health endpoint with a small bounded timeout
    async fn probe(&self, node: &NodeId, timeout: Duration) -> Result<NodeProbe>;
}

/// Client for the llama.cpp coordinator's protocol dialect
///
/// The coordinator speaks OpenAI-style `/v1/chat/completions` for chat and
/// llama.cpp's native `/completion` for raw generation; the router
/// translates responses back into Ollama shape.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// Forward a payload to the coordinator endpoint (`host:port`) and
    /// return its dialect-native response
    async fn forward(
        &self,
        endpoint: &str,
        payload: &InferencePayload,
        timeout: Duration,
    ) -> Result<Value>;
}
