//! `fetchURLs`: concurrent HTTP GET over a list of URLs, each capped at a
//! fixed timeout (§5: "HTTP fetch 30 s").

use async_trait::async_trait;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde_json::{json, Value};
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FetchUrlsTool {
    client: reqwest::Client,
}

impl FetchUrlsTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build().unwrap_or_default(),
        }
    }
}

impl Default for FetchUrlsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchUrlsTool {
    fn name(&self) -> &str {
        "fetchURLs"
    }

    fn description(&self) -> &str {
        "Fetch the text content of one or more URLs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["urls"],
            "properties": {"urls": {"type": "array"}}
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { requires_network: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        let urls: Vec<String> = input
            .get("urls")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut fetched = Vec::with_capacity(urls.len());
        for url in urls {
            if ctx.abort.is_aborted() {
                return Err(DagFlowError::Abort);
            }
            ctx.events.progress(format!("fetching {url}"));
            let outcome = self.client.get(&url).send().await;
            let entry = match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    json!({"url": url, "status": status, "content": body})
                }
                Err(e) => json!({"url": url, "error": e.to_string()}),
            };
            fetched.push(entry);
        }
        ctx.events.completed(format!("fetched {} url(s)", fetched.len()));
        Ok(json!({"results": fetched}))
    }
}
