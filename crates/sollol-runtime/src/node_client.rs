//! Ollama Node Client
//!
//! Forwards inference payloads to pool nodes over the Ollama wire protocol
//! and probes their health endpoints. The payload body passes through
//! opaquely; the gateway never re-serializes semantics it does not own.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use sollol_core::{
    GatewayError, InferencePayload, NodeClient, NodeId, NodeProbe, Result,
};

/// reqwest-backed pool node client
#[derive(Clone, Debug)]
pub struct HttpNodeClient {
    http: reqwest::Client,
}

impl Default for HttpNodeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpNodeClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    fn map_send_error(node: &NodeId, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(format!("{node}: {err}"))
        } else {
            GatewayError::Upstream(format!("{node}: {err}"))
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn execute(
        &self,
        node: &NodeId,
        payload: &InferencePayload,
        timeout: Duration,
    ) -> Result<Value> {
        let url = format!("{}{}", node.base_url(), payload.api_path());

        let response = self
            .http
            .post(&url)
            .json(&payload.forward_body())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(node, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "{node} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{node} sent invalid JSON: {e}")))
    }

    async fn probe(&self, node: &NodeId, timeout: Duration) -> Result<NodeProbe> {
        let url = format!("{}/api/tags", node.base_url());
        let started = Instant::now();

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(node, &e))?;

        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "{node} health probe returned {}",
                response.status()
            )));
        }

        // The plain Ollama API exposes neither CPU load nor free VRAM;
        // those stay at their last-known values in the registry
        Ok(NodeProbe {
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            cpu_load: None,
            free_vram_mib: None,
        })
    }
}
