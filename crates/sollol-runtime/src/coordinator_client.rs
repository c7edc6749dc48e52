//! Coordinator Client
//!
//! Speaks the llama.cpp coordinator's protocol dialect: OpenAI-compatible
//! `/v1/chat/completions` for chat and the native `/completion` endpoint
//! for raw generation. The router translates responses back to Ollama shape.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use sollol_core::{CoordinatorClient, GatewayError, InferencePayload, Result};

/// Generation defaults when the caller does not override them
const DEFAULT_MAX_TOKENS: u64 = 512;
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// reqwest-backed coordinator client
#[derive(Clone, Debug)]
pub struct HttpCoordinatorClient {
    http: reqwest::Client,
}

impl Default for HttpCoordinatorClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCoordinatorClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    async fn post(&self, url: &str, body: Value, timeout: Duration) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::UpstreamTimeout(format!("coordinator: {e}"))
                } else {
                    GatewayError::Upstream(format!("coordinator: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream(format!(
                "coordinator returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("coordinator sent invalid JSON: {e}")))
    }
}

/// Caller-supplied generation options from the Ollama-style `options` block
fn generation_options(payload: &InferencePayload) -> (u64, f64) {
    let options = payload.forward_body().get("options").cloned().unwrap_or(Value::Null);
    let max_tokens = options
        .get("num_predict")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_TOKENS);
    let temperature = options
        .get("temperature")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TEMPERATURE);
    (max_tokens, temperature)
}

#[async_trait]
impl CoordinatorClient for HttpCoordinatorClient {
    async fn forward(
        &self,
        endpoint: &str,
        payload: &InferencePayload,
        timeout: Duration,
    ) -> Result<Value> {
        let (max_tokens, temperature) = generation_options(payload);

        match payload {
            InferencePayload::Chat { messages, .. } => {
                let body = json!({
                    "messages": messages,
                    "max_tokens": max_tokens,
                    "temperature": temperature,
                    "stream": false,
                });
                self.post(&format!("http://{endpoint}/v1/chat/completions"), body, timeout)
                    .await
            }
            InferencePayload::Generate { prompt, .. } => {
                let body = json!({
                    "prompt": prompt,
                    "n_predict": max_tokens,
                    "temperature": temperature,
                    "stream": false,
                });
                self.post(&format!("http://{endpoint}/completion"), body, timeout)
                    .await
            }
            InferencePayload::Embed { .. } => Err(GatewayError::Upstream(
                "embedding requests are not served by the coordinator".into(),
            )),
        }
    }
}
