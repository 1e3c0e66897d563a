use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationDefaults;
use crate::error::ForwardError;

/// Inbound chat request body.
///
/// Missing fields decode to their empty value so they are reported by
/// [`ChatRequest::validate`] instead of failing the decode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn decode(body: &[u8]) -> Result<Self, ForwardError> {
        serde_json::from_slice(body).map_err(|e| ForwardError::Decode(e.to_string()))
    }

    /// Check required fields, reporting every violation at once
    pub fn validate(&self) -> Result<(), ForwardError> {
        let mut violations = Vec::new();
        if self.model_name.is_empty() {
            violations.push("modelName is required");
        }
        if self.message.is_empty() {
            violations.push("message is required");
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ForwardError::Validation(violations.join(", ")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamMessage {
    pub role: String,
    pub content: String,
}

/// Ollama chat request sent upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stop: Vec<String>,
}

impl UpstreamPayload {
    /// Build a single-turn user conversation with the fixed generation defaults
    pub fn from_request(req: &ChatRequest, defaults: &GenerationDefaults) -> Self {
        debug!(
            model = %req.model_name,
            stream = req.stream,
            temperature = defaults.temperature,
            max_tokens = defaults.max_tokens,
            "Building upstream chat payload"
        );

        Self {
            model: req.model_name.clone(),
            messages: vec![UpstreamMessage {
                role: "user".to_string(),
                content: req.message.clone(),
            }],
            stream: req.stream,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            top_p: defaults.top_p,
            stop: defaults.stop.clone(),
        }
    }
}

/// Chat endpoint for a base URL: exactly one slash, then `chat`
pub fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat", base_url.trim_end_matches('/'))
}
