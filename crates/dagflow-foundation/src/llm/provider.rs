//! The LLM transport contract (§6): a chat call returning content plus
//! usage/cost/generation-stats and a finish reason, cancellable via an
//! [`AbortSignal`]. The transport itself — HTTP calls to a provider's API —
//! is out of scope (§1 Non-goals); this module only defines the seam.

use async_trait::async_trait;
use dagflow_kernel::model::Usage;
use dagflow_kernel::tool::AbortSignal;
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub seed: Option<u64>,
    pub abort: Option<AbortSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
    pub cost_usd: Option<String>,
    pub generation_stats: Option<Value>,
    pub finish_reason: FinishReason,
}

/// `(provider, model)` key identifying a concrete LLM transport, used as the
/// cache key for the process-wide provider instance cache (§5).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub provider: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> DagFlowResult<ChatResponse>;

    /// Advisory: whether the given model supports tool-calling (`chatWithTools`,
    /// an alternate surface not used by the core per §6).
    fn validate_tool_call_support(&self, _model: &str) -> (bool, Option<String>) {
        (false, Some("tool-call transport is not part of the core".to_string()))
    }
}

/// Extract the first fenced code block (preferring one labelled `json`, else
/// any fenced block, else the whole body) and parse it as JSON (§4.1 step d,
/// §6 Plan JSON: "tolerates a leading language tag, missing language tag, or
/// raw JSON body").
pub fn extract_json_block(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            let block = rest[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return block;
            }
        }
    }
    text.trim()
}

pub fn parse_llm_json(text: &str) -> DagFlowResult<Value> {
    let candidate = extract_json_block(text);
    serde_json::from_str(candidate).map_err(|e| DagFlowError::validation(format!("unparseable plan JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_labelled_fence() {
        let text = "Here is the plan:\n```json\n{\"a\":1}\n```\nThanks";
        assert_eq!(extract_json_block(text), r#"{"a":1}"#);
    }

    #[test]
    fn extracts_unlabelled_fence() {
        let text = "```\n{\"a\":1}\n```";
        assert_eq!(extract_json_block(text), r#"{"a":1}"#);
    }

    #[test]
    fn falls_back_to_raw_body() {
        let text = "{\"a\":1}";
        assert_eq!(extract_json_block(text), r#"{"a":1}"#);
    }

    #[test]
    fn parse_llm_json_rejects_garbage() {
        assert!(parse_llm_json("not json at all").is_err());
    }
}
