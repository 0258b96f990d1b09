//! `dagflow run` command implementation: execute or resume a planned DAG.

use crate::context::CliContext;
use crate::error::CliError;
use dagflow_runtime::ExecutionConfig;
use serde_json::json;

pub async fn run(
    ctx: &CliContext,
    dag_id: String,
    execution_id: Option<String>,
    skip_events: bool,
) -> Result<serde_json::Value, CliError> {
    let config = ExecutionConfig { skip_events, batch_db_updates: true, abort: None };

    let handle = match execution_id {
        Some(id) => ctx.executor.resume(&id, config).await?,
        None => ctx.executor.execute(&dag_id, config).await?,
    };

    Ok(json!({
        "executionId": handle.execution_id,
        "status": handle.status,
        "retryCount": handle.retry_count,
    }))
}
