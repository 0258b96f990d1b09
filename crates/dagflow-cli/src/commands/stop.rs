//! `dagflow stop` command implementation: request a cooperative stop.

use crate::context::CliContext;
use crate::error::CliError;
use serde_json::json;

pub async fn run(
    ctx: &CliContext,
    dag: Option<String>,
    execution: Option<String>,
) -> Result<serde_json::Value, CliError> {
    match (dag, execution) {
        (Some(dag_id), None) => {
            let req = ctx.stop.request_stop_for_dag(&dag_id).await?;
            Ok(json!({"stopRequestId": req.id, "status": "requested"}))
        }
        (None, Some(execution_id)) => {
            let req = ctx.stop.request_stop_for_execution(&execution_id).await?;
            Ok(json!({"stopRequestId": req.id, "status": "requested"}))
        }
        _ => Err(CliError::Other("exactly one of --dag or --execution is required".to_string())),
    }
}
