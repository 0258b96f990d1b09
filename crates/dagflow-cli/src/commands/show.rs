//! `dagflow show` command implementation: read-only inspection of stored
//! DAGs, executions, and sub-steps.

use crate::context::CliContext;
use crate::error::CliError;
use dagflow_kernel::DagFlowError;
use serde_json::json;

pub async fn run_dags(ctx: &CliContext) -> Result<serde_json::Value, CliError> {
    let dags = ctx.store.list_dags().await?;
    Ok(json!(dags))
}

pub async fn run_dag(ctx: &CliContext, dag_id: String) -> Result<serde_json::Value, CliError> {
    let dag = ctx.store.get_dag(&dag_id).await?.ok_or_else(|| DagFlowError::not_found(&dag_id))?;
    Ok(json!(dag))
}

pub async fn run_executions(
    ctx: &CliContext,
    dag_id: Option<String>,
) -> Result<serde_json::Value, CliError> {
    let executions = ctx.executor.list(dag_id.as_deref()).await?;
    Ok(json!(executions))
}

pub async fn run_execution(ctx: &CliContext, execution_id: String) -> Result<serde_json::Value, CliError> {
    let (execution, sub_steps) = ctx
        .executor
        .get_with_sub_steps(&execution_id)
        .await?
        .ok_or_else(|| DagFlowError::not_found(&execution_id))?;
    Ok(json!({"execution": execution, "subSteps": sub_steps}))
}
