//! `dagflow resume` command implementation: answers a planner clarification.

use crate::context::CliContext;
use crate::error::CliError;
use dagflow_foundation::PlanningResult;
use serde_json::json;

pub async fn run(ctx: &CliContext, dag_id: String, answer: String) -> Result<serde_json::Value, CliError> {
    let result = ctx.planner.resume_from_clarification(&dag_id, &answer).await?;

    Ok(match result {
        PlanningResult::Success { dag_id } => json!({"status": "success", "dagId": dag_id}),
        PlanningResult::ClarificationRequired { dag_id, query } => {
            json!({"status": "pending", "dagId": dag_id, "clarifyingQuestion": query})
        }
        PlanningResult::ValidationError { dag_id } => {
            json!({"status": "validation_error", "dagId": dag_id})
        }
    })
}
