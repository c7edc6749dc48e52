//! Inference Payloads
//!
//! Inbound Ollama-protocol request bodies modeled as tagged variants. The
//! original JSON value is preserved so forwarding never re-serializes
//! semantics the router does not understand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};

/// Fallback model when a request omits one
pub const DEFAULT_MODEL: &str = "llama3.2";

/// A single chat message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Input for an embedding request: one string or a batch
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbedInput {
    pub fn total_chars(&self) -> usize {
        match self {
            EmbedInput::Single(s) => s.len(),
            EmbedInput::Batch(items) => items.iter().map(String::len).sum(),
        }
    }
}

/// An analyzed inbound request, with the raw body kept for pass-through
#[derive(Clone, Debug)]
pub enum InferencePayload {
    Chat { raw: Value, model: String, messages: Vec<ChatMessage> },
    Generate { raw: Value, model: String, prompt: String },
    Embed { raw: Value, model: String, input: EmbedInput },
}

impl InferencePayload {
    /// Classify a raw JSON body by structure: `messages` → chat, `prompt` →
    /// generate, `input` → embed.
    pub fn parse(raw: Value) -> Result<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| GatewayError::BadRequest("request body must be a JSON object".into()))?;

        let model = match obj.get("model").and_then(Value::as_str) {
            Some(m) if !m.trim().is_empty() => m.trim().to_string(),
            _ => DEFAULT_MODEL.to_string(),
        };

        if let Some(messages) = obj.get("messages") {
            let messages: Vec<ChatMessage> = serde_json::from_value(messages.clone())
                .map_err(|e| GatewayError::BadRequest(format!("invalid messages: {e}")))?;
            if messages.is_empty() {
                return Err(GatewayError::BadRequest("no messages provided".into()));
            }
            return Ok(Self::Chat { raw, model, messages });
        }

        if let Some(prompt) = obj.get("prompt") {
            let prompt = prompt
                .as_str()
                .ok_or_else(|| GatewayError::BadRequest("prompt must be a string".into()))?
                .to_string();
            if prompt.is_empty() {
                return Err(GatewayError::BadRequest("no prompt provided".into()));
            }
            return Ok(Self::Generate { raw, model, prompt });
        }

        if let Some(input) = obj.get("input") {
            let input: EmbedInput = serde_json::from_value(input.clone())
                .map_err(|e| GatewayError::BadRequest(format!("invalid input: {e}")))?;
            return Ok(Self::Embed { raw, model, input });
        }

        Err(GatewayError::BadRequest(
            "expected one of 'messages', 'prompt' or 'input'".into(),
        ))
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Chat { model, .. } | Self::Generate { model, .. } | Self::Embed { model, .. } => {
                model
            }
        }
    }

    /// Ollama API path this payload is forwarded to
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "/api/chat",
            Self::Generate { .. } => "/api/generate",
            Self::Embed { .. } => "/api/embed",
        }
    }

    /// Total input size in characters, used for complexity estimation
    pub fn input_chars(&self) -> usize {
        match self {
            Self::Chat { messages, .. } => messages.iter().map(|m| m.content.len()).sum(),
            Self::Generate { prompt, .. } => prompt.len(),
            Self::Embed { input, .. } => input.total_chars(),
        }
    }

    /// Content of the last user-authored message (the prompt for generate)
    pub fn last_user_content(&self) -> Option<&str> {
        match self {
            Self::Chat { messages, .. } => messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.as_str()),
            Self::Generate { prompt, .. } => Some(prompt),
            Self::Embed { .. } => None,
        }
    }

    /// Requested priority, if the caller supplied one
    pub fn priority(&self) -> Option<i64> {
        self.raw().get("priority").and_then(Value::as_i64)
    }

    fn raw(&self) -> &Value {
        match self {
            Self::Chat { raw, .. } | Self::Generate { raw, .. } | Self::Embed { raw, .. } => raw,
        }
    }

    /// Body to forward upstream: streaming forced off, gateway-only fields
    /// stripped, and the default model made explicit.
    pub fn forward_body(&self) -> Value {
        let mut body = self.raw().clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("stream".into(), Value::Bool(false));
            obj.insert("model".into(), Value::String(self.model().to_string()));
            obj.remove("priority");
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat() {
        let payload = InferencePayload::parse(json!({
            "model": "llama3.2",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert!(matches!(payload, InferencePayload::Chat { .. }));
        assert_eq!(payload.model(), "llama3.2");
        assert_eq!(payload.api_path(), "/api/chat");
        assert_eq!(payload.last_user_content(), Some("hi"));
    }

    #[test]
    fn test_parse_generate_and_embed() {
        let generate = InferencePayload::parse(json!({"prompt": "Once upon a time"})).unwrap();
        assert!(matches!(generate, InferencePayload::Generate { .. }));
        assert_eq!(generate.model(), DEFAULT_MODEL);

        let embed = InferencePayload::parse(json!({
            "model": "nomic-embed-text",
            "input": ["a", "bb"]
        }))
        .unwrap();
        assert_eq!(embed.input_chars(), 3);
        assert_eq!(embed.api_path(), "/api/embed");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(InferencePayload::parse(json!("not an object")).is_err());
        assert!(InferencePayload::parse(json!({"model": "x"})).is_err());
        assert!(InferencePayload::parse(json!({"messages": []})).is_err());
        assert!(InferencePayload::parse(json!({"prompt": ""})).is_err());
    }

    #[test]
    fn test_forward_body_sanitized() {
        let payload = InferencePayload::parse(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true,
            "priority": 9
        }))
        .unwrap();

        let body = payload.forward_body();
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["model"], json!(DEFAULT_MODEL));
        assert!(body.get("priority").is_none());
    }
}
