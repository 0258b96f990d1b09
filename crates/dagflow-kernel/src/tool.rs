//! The tool contract: a typed name→tool registry where each tool declares an
//! input schema and runs under a [`ToolContext`] carrying cancellation,
//! a store handle, an artifacts directory, and a per-task event emitter.

use crate::error::{DagFlowError, DagFlowResult};
use crate::storage::Store;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A cooperative cancellation flag shared between the executor and a
/// running tool. Cheap to clone; `abort()` is idempotent.
#[derive(Clone)]
pub struct AbortSignal {
    rx: tokio::sync::watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is aborted — tools awaiting I/O can race this
    /// against their transport future.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct AbortHandle {
    tx: tokio::sync::watch::Sender<bool>,
}

impl AbortHandle {
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// The tool-driven half of the executor's per-task event emitter: `progress`
/// and `completed` callbacks a tool uses to report in-flight state. Backed by
/// the event bus (`crate::bus`) via a closure so `dagflow-kernel` does not
/// need to depend on any particular bus implementation detail here.
#[derive(Clone)]
pub struct EventEmitter {
    emit: Arc<dyn Fn(EmittedTaskEvent) + Send + Sync>,
}

#[derive(Debug, Clone)]
pub enum EmittedTaskEvent {
    Progress(String),
    Completed(String),
}

impl EventEmitter {
    pub fn new(emit: impl Fn(EmittedTaskEvent) + Send + Sync + 'static) -> Self {
        Self { emit: Arc::new(emit) }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn progress(&self, message: impl Into<String>) {
        (self.emit)(EmittedTaskEvent::Progress(message.into()));
    }

    pub fn completed(&self, message: impl Into<String>) {
        (self.emit)(EmittedTaskEvent::Completed(message.into()));
    }
}

/// Context a tool runs under.
pub struct ToolContext {
    pub execution_id: String,
    pub sub_step_id: String,
    pub store: Arc<dyn Store>,
    pub abort: AbortSignal,
    pub artifacts_dir: PathBuf,
    pub events: EventEmitter,
}

impl ToolContext {
    /// Resolve a path relative to the artifacts directory, refusing any path
    /// that would escape it (§6: tools that write files refuse paths that
    /// escape the artifacts directory).
    pub fn resolve_artifact_path(&self, relative: &str) -> DagFlowResult<PathBuf> {
        let joined = self.artifacts_dir.join(relative);
        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&self.artifacts_dir) {
            return Err(DagFlowError::validation(format!(
                "path '{relative}' escapes the artifacts directory"
            )));
        }
        Ok(normalized)
    }
}

fn normalize_lexically(path: &std::path::Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub category: Option<String>,
    pub requires_network: bool,
    pub requires_filesystem: bool,
    pub is_dangerous: bool,
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self {
            category: None,
            requires_network: false,
            requires_filesystem: false,
            is_dangerous: false,
        }
    }
}

/// A typed "tool": shell, file I/O, web fetch, web search, email, webhook.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::default()
    }

    /// Validate `input` against `input_schema` before `execute` runs. The
    /// default forwards to [`crate::schema_validate`]; tools with extra
    /// invariants beyond the JSON Schema may override this.
    fn validate_input(&self, input: &Value) -> DagFlowResult<()> {
        crate::schema::validate_against_schema(input, &self.input_schema())
            .map_err(|e| DagFlowError::validation(format!("{}: {e}", self.name())))
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> DagFlowResult<Value>;
}

/// Name → tool map.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// JSON definitions of every registered tool, used to fill the `{{tools}}`
    /// token in the planner's system prompt (§4.1 step 2).
    pub fn definitions_json(&self) -> Value {
        Value::Array(
            self.tools
                .values()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name(),
                        "description": t.description(),
                        "inputSchema": t.input_schema(),
                    })
                })
                .collect(),
        )
    }

    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> DagFlowResult<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| DagFlowError::tool(name, "tool not registered"))?;
        tool.validate_input(&input)?;
        tool.execute(input, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_refuses_escape() {
        let (_handle, abort) = AbortHandle::new();
        let ctx = ToolContext {
            execution_id: "exec_1".into(),
            sub_step_id: "substep_1".into(),
            store: Arc::new(crate::storage::memory::InMemoryStore::new()),
            abort,
            artifacts_dir: PathBuf::from("/tmp/artifacts"),
            events: EventEmitter::noop(),
        };
        assert!(ctx.resolve_artifact_path("report.md").is_ok());
        assert!(ctx.resolve_artifact_path("../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn abort_signal_resolves_after_abort() {
        let (handle, signal) = AbortHandle::new();
        assert!(!signal.is_aborted());
        handle.abort();
        signal.aborted().await;
        assert!(signal.is_aborted());
    }
}
