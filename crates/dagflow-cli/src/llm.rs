//! The concrete LLM transport wired into the CLI. The transport contract
//! itself (`LLMProvider`) is defined in `dagflow_foundation::llm` and is
//! deliberately provider-agnostic; this module supplies the one thing the
//! core never implements (§1 Non-goals: "the transport itself... is out of
//! scope") — an OpenAI-chat-completions-shaped HTTP call, reused for any
//! compatible endpoint (Ollama, vLLM, LocalAI, etc. via a custom base URL),
//! following the same provider/config split as the teacher's
//! `llm/openai.rs`, generalized to a plain `reqwest` call.

use async_trait::async_trait;
use dagflow_foundation::llm::{ChatRequest, ChatResponse, FinishReason, LLMProvider};
use dagflow_kernel::model::Usage;
use dagflow_kernel::tool::AbortSignal;
use dagflow_kernel::{DagFlowError, DagFlowResult};
use dagflow_runtime::LlmResolver;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl OpenAiCompatConfig {
    /// Reads `{PROVIDER}_API_KEY` / `{PROVIDER}_BASE_URL` (provider name
    /// upper-cased), defaulting the base URL to OpenAI's own endpoint.
    pub fn from_env(provider: &str, model: &str) -> Self {
        let prefix = provider.to_uppercase();
        let base_url = std::env::var(format!("{prefix}_BASE_URL"))
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok();
        Self { base_url, api_key, model: model.to_string() }
    }
}

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn chat(&self, request: ChatRequest) -> DagFlowResult<ChatResponse> {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(seed) = request.seed {
            body["seed"] = json!(seed);
        }

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let send = builder.send();
        let response = match request.abort {
            Some(abort) => race_abort(send, abort).await?,
            None => send.await.map_err(|e| DagFlowError::LlmTransport(e.to_string()))?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DagFlowError::LlmTransport(format!("{status}: {text}")));
        }

        let payload: Value =
            response.json().await.map_err(|e| DagFlowError::LlmTransport(e.to_string()))?;
        parse_chat_completion(&payload)
    }
}

async fn race_abort(
    send: reqwest::RequestBuilder,
    abort: AbortSignal,
) -> DagFlowResult<reqwest::Response> {
    tokio::select! {
        result = send.send() => result.map_err(|e| DagFlowError::LlmTransport(e.to_string())),
        _ = abort.aborted() => Err(DagFlowError::Abort),
    }
}

fn parse_chat_completion(payload: &Value) -> DagFlowResult<ChatResponse> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| DagFlowError::LlmTransport("response had no message content".to_string()))?
        .to_string();

    let finish_reason = match payload["choices"][0]["finish_reason"].as_str() {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("stop") | None => FinishReason::Stop,
        Some(_) => FinishReason::Stop,
    };

    let usage = payload.get("usage").map(|u| Usage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
    });

    Ok(ChatResponse { content, usage, cost_usd: None, generation_stats: None, finish_reason })
}

/// Resolves `(provider, model)` to a cached `OpenAiCompatProvider`, reading
/// credentials from the environment the first time each pair is seen (§5).
pub struct EnvLlmResolver {
    cache: Mutex<HashMap<(String, String), Arc<dyn LLMProvider>>>,
}

impl EnvLlmResolver {
    pub fn new() -> Self {
        Self { cache: Mutex::new(HashMap::new()) }
    }
}

impl Default for EnvLlmResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmResolver for EnvLlmResolver {
    async fn resolve(&self, provider: &str, model: &str) -> DagFlowResult<Arc<dyn LLMProvider>> {
        let key = (provider.to_string(), model.to_string());
        let mut cache = self.cache.lock().await;
        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }
        let config = OpenAiCompatConfig::from_env(provider, model);
        let instance: Arc<dyn LLMProvider> = Arc::new(OpenAiCompatProvider::new(config));
        cache.insert(key, instance.clone());
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_completion() {
        let payload = json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12},
        });
        let response = parse_chat_completion(&payload).unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(response.usage.unwrap().total_tokens, 12);
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn missing_content_is_a_transport_error() {
        let payload = json!({"choices": [{}]});
        assert!(parse_chat_completion(&payload).is_err());
    }

    #[tokio::test]
    async fn resolver_caches_by_provider_and_model() {
        let resolver = EnvLlmResolver::new();
        let a = resolver.resolve("openai", "gpt-4o-mini").await.unwrap();
        let b = resolver.resolve("openai", "gpt-4o-mini").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
