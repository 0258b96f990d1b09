//! `dagflow plan` command implementation.

use crate::context::CliContext;
use crate::error::CliError;
use dagflow_foundation::{CreateFromGoalOptions, PlanningResult};
use serde_json::json;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    ctx: &CliContext,
    goal: String,
    agent: String,
    provider: Option<String>,
    model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    cron: Option<String>,
    timezone: String,
) -> Result<serde_json::Value, CliError> {
    let options = CreateFromGoalOptions {
        goal_text: goal,
        agent_name: agent,
        provider,
        model,
        temperature,
        max_tokens,
        seed: None,
        cron_schedule: cron,
        schedule_active: None,
        timezone,
        abort: None,
    };

    let result = ctx.planner.create_from_goal(options).await?;

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
