//! `writeFile`: writes text content under the artifacts directory, refusing
//! any path that escapes it (§6 Artifacts directory).

use async_trait::async_trait;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::DagFlowResult;
use serde_json::{json, Value};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "writeFile"
    }

    fn description(&self) -> &str {
        "Write text content to a file under the execution's artifacts directory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { requires_filesystem: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        let path = input.get("path").and_then(Value::as_str).unwrap_or("output.txt");
        let content = input.get("content").and_then(Value::as_str).unwrap_or_default();
        let resolved = ctx.resolve_artifact_path(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        ctx.events.completed(format!("wrote {}", resolved.display()));
        Ok(json!({"path": resolved.to_string_lossy(), "bytesWritten": content.len()}))
    }
}
