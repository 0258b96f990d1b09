//! `webhook`: POST a JSON payload to a caller-supplied URL, completing the
//! §1 tool roster ("shell, file I/O, web fetch, web search, email,
//! webhook"). Shares `fetchURLs`'s `reqwest::Client`/timeout shape; unlike
//! `sendEmail` there is no artifact-directory side effect since a webhook
//! call has nothing durable to record beyond the response itself.

use async_trait::async_trait;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde_json::{json, Value};
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebhookTool {
    client: reqwest::Client,
}

impl WebhookTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build().unwrap_or_default(),
        }
    }
}

impl Default for WebhookTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebhookTool {
    fn name(&self) -> &str {
        "webhook"
    }

    fn description(&self) -> &str {
        "POST a JSON payload to an external URL and return the response status and body."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {"type": "string"},
                "method": {"type": "string"},
                "payload": {"type": "object"},
                "headers": {"type": "object"}
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { requires_network: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        if ctx.abort.is_aborted() {
            return Err(DagFlowError::Abort);
        }
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| DagFlowError::validation("webhook requires a 'url' string"))?;
        let method = input.get("method").and_then(Value::as_str).unwrap_or("POST").to_uppercase();
        let payload = input.get("payload").cloned().unwrap_or_else(|| json!({}));

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            _ => self.client.post(url),
        };
        if let Some(headers) = input.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }
        if method != "GET" {
            request = request.json(&payload);
        }

        ctx.events.progress(format!("{method} {url}"));
        let response = request.send().await.map_err(|e| DagFlowError::tool("webhook", e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ctx.events.completed(format!("webhook responded {status}"));
        Ok(json!({"url": url, "status": status, "body": body}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_url() {
        let tool = WebhookTool::new();
        assert_eq!(tool.name(), "webhook");
        assert!(tool.input_schema()["required"].as_array().unwrap().contains(&json!("url")));
    }
}
