//! `webSearch`: a stub consistent with the tool roster (shell, file I/O,
//! web fetch, web search, email, webhook). Ships unimplemented against a
//! real search backend — no search API is part of the teacher's or the
//! retrieved pack's dependency stack — but it still validates input and
//! returns a well-formed, empty result set so the executor and the
//! dependency-substitution rules have something concrete to dispatch to.

use async_trait::async_trait;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde_json::{json, Value};

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "webSearch"
    }

    fn description(&self) -> &str {
        "Search the web for a query. Stub: returns no results until a search backend is configured."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string"},
                "maxResults": {"type": "number"}
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { requires_network: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| DagFlowError::validation("webSearch requires a 'query' string"))?;
        if ctx.abort.is_aborted() {
            return Err(DagFlowError::Abort);
        }
        ctx.events.completed(format!("webSearch stub: no backend configured for '{query}'"));
        Ok(json!({"query": query, "results": []}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_kernel::storage::memory::InMemoryStore;
    use dagflow_kernel::tool::{AbortHandle, EventEmitter};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_empty_results_without_error() {
        let (_handle, abort) = AbortHandle::new();
        let ctx = ToolContext {
            execution_id: "exec_1".into(),
            sub_step_id: "substep_1".into(),
            store: Arc::new(InMemoryStore::new()),
            abort,
            artifacts_dir: std::env::temp_dir(),
            events: EventEmitter::noop(),
        };
        let tool = WebSearchTool;
        let result = tool.execute(json!({"query": "rust dag executor"}), &ctx).await.unwrap();
        assert_eq!(result["results"].as_array().unwrap().len(), 0);
    }
}
