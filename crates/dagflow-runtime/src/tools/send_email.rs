//! `sendEmail`: hands a composed message to an external mail relay.
//!
//! SMTP/IMAP are explicitly out of scope (§1 Non-goals: "the tool
//! implementations themselves ... each already validates its own inputs");
//! actual delivery is a narrow external collaborator. This implementation
//! validates the message, writes it to the artifacts directory as an
//! outbox record (so a run is always inspectable after the fact even
//! without a relay configured), and — when `relayUrl` is given — POSTs the
//! same JSON body to that HTTP relay, mirroring `fetchURLs`'s reqwest usage.

use async_trait::async_trait;
use chrono::Utc;
use dagflow_kernel::tool::{Tool, ToolContext, ToolMetadata};
use dagflow_kernel::{DagFlowError, DagFlowResult};
use serde_json::{json, Value};
use std::time::Duration;

const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SendEmailTool {
    client: reqwest::Client,
}

impl SendEmailTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder().timeout(RELAY_TIMEOUT).build().unwrap_or_default(),
        }
    }
}

impl Default for SendEmailTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "sendEmail"
    }

    fn description(&self) -> &str {
        "Compose and hand off an email, with optional attachments, to a mail relay."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["to", "subject", "body"],
            "properties": {
                "to": {"type": "array"},
                "subject": {"type": "string"},
                "body": {"type": "string"},
                "attachments": {"type": "array"},
                "relayUrl": {"type": "string"}
            }
        })
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata { requires_network: true, requires_filesystem: true, ..ToolMetadata::default() }
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        if ctx.abort.is_aborted() {
            return Err(DagFlowError::Abort);
        }
        let to: Vec<String> = input
            .get("to")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if to.is_empty() {
            return Err(DagFlowError::validation("sendEmail requires a non-empty 'to' list"));
        }
        let subject = input.get("subject").and_then(Value::as_str).unwrap_or_default();
        let body = input.get("body").and_then(Value::as_str).unwrap_or_default();
        let attachments = input.get("attachments").cloned().unwrap_or_else(|| json!([]));

        let message = json!({
            "to": to,
            "subject": subject,
            "body": body,
            "attachments": attachments,
            "sentAt": Utc::now().to_rfc3339(),
        });

        let outbox_path = ctx.resolve_artifact_path(&format!("outbox/{}.json", ctx.sub_step_id))?;
        if let Some(parent) = outbox_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&outbox_path, serde_json::to_vec_pretty(&message)?).await?;

        let relayed = if let Some(relay_url) = input.get("relayUrl").and_then(Value::as_str) {
            ctx.events.progress(format!("relaying to {relay_url}"));
            match self.client.post(relay_url).json(&message).send().await {
                Ok(resp) => json!({"relayed": true, "status": resp.status().as_u16()}),
                Err(e) => json!({"relayed": false, "error": e.to_string()}),
            }
        } else {
            json!({"relayed": false})
        };

        ctx.events.completed(format!("queued email to {} recipient(s)", to.len()));
        Ok(json!({
            "to": to,
            "subject": subject,
            "attachments": attachments,
            "outboxPath": outbox_path.to_string_lossy(),
            "relay": relayed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_kernel::storage::memory::InMemoryStore;
    use dagflow_kernel::tool::{AbortHandle, EventEmitter};
    use std::sync::Arc;

    fn ctx(dir: std::path::PathBuf) -> ToolContext {
        let (_handle, abort) = AbortHandle::new();
        ToolContext {
            execution_id: "exec_1".into(),
            sub_step_id: "substep_1".into(),
            store: Arc::new(InMemoryStore::new()),
            abort,
            artifacts_dir: dir,
            events: EventEmitter::noop(),
        }
    }

    #[tokio::test]
    async fn writes_outbox_record_without_a_relay() {
        let dir = std::env::temp_dir().join(format!("dagflow-send-email-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let tool = SendEmailTool::new();
        let result = tool
            .execute(json!({"to": ["ada@example.com"], "subject": "hi", "body": "hello"}), &ctx(dir.clone()))
            .await
            .unwrap();
        assert_eq!(result["relay"]["relayed"], false);
        let outbox_path = result["outboxPath"].as_str().unwrap();
        assert!(tokio::fs::metadata(outbox_path).await.is_ok());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn empty_recipients_is_a_validation_error() {
        let dir = std::env::temp_dir();
        let tool = SendEmailTool::new();
        let err = tool
            .execute(json!({"to": [], "subject": "hi", "body": "hello"}), &ctx(dir))
            .await
            .unwrap_err();
        assert!(matches!(err, DagFlowError::Validation(_)));
    }
}
