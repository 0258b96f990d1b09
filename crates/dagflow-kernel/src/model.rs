//! Entities for the DAG planning-and-execution engine: the persisted `Dag` and
//! its `Plan` payload, a `DagExecution` run of that plan, per-node `SubStep`
//! rows, and `StopRequest`/`Agent` records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

pub fn new_dag_id() -> String {
    format!("dag_{}", Uuid::new_v4())
}

pub fn new_execution_id() -> String {
    format!("exec_{}", Uuid::new_v4())
}

pub fn new_substep_id() -> String {
    format!("substep_{}", Uuid::new_v4())
}

pub fn new_stop_request_id() -> String {
    format!("stop_{}", Uuid::new_v4())
}

/// The synthetic task id used for the synthesis sub-step.
pub const SYNTHESIS_TASK_ID: &str = "__SYNTHESIS__";

/// Sentinel dependency value meaning "this sub-task is a root".
pub const NO_DEPENDENCIES: &str = "none";

// ---------------------------------------------------------------------------
// Usage / cost
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Parse a `costUsd` string into a `Decimal`, per §4.5: monetary values are
/// stored as strings to avoid binary-float rounding.
pub fn parse_cost(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw).ok()
}

/// Sum an iterator of optional cost strings, returning `None` if none
/// contributed a value (P6: null when no sub-step reported a cost).
pub fn aggregate_cost<'a, I: IntoIterator<Item = Option<&'a str>>>(costs: I) -> Option<Decimal> {
    let mut total: Option<Decimal> = None;
    for raw in costs {
        if let Some(parsed) = raw.and_then(parse_cost) {
            total = Some(total.unwrap_or(Decimal::ZERO) + parsed);
        }
    }
    total
}

/// Sum an iterator of optional usages, returning `None` if none contributed.
pub fn aggregate_usage<'a, I: IntoIterator<Item = Option<&'a Usage>>>(usages: I) -> Option<Usage> {
    let mut total: Option<Usage> = None;
    for u in usages {
        if let Some(u) = u {
            let mut acc = total.unwrap_or_default();
            acc.add(u);
            total = Some(acc);
        }
    }
    total
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    pub primary: String,
    #[serde(default)]
    pub sub_intents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanValidation {
    pub coverage: Coverage,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub iteration_triggers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Tool,
    Inference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOrPrompt {
    pub name: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub thought: String,
    pub action_type: ActionType,
    pub tool_or_prompt: ToolOrPrompt,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl SubTask {
    /// Whether this sub-task is a root — no real dependencies.
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
            || (self.dependencies.len() == 1 && self.dependencies[0] == NO_DEPENDENCIES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub original_request: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub synthesis_plan: String,
    pub validation: PlanValidation,
    #[serde(default)]
    pub clarification_needed: bool,
    #[serde(default)]
    pub clarification_query: Option<String>,
    #[serde(default)]
    pub sub_tasks: Vec<SubTask>,
}

/// Renumber every sub-task id to a contiguous zero-padded sequence
/// (`"001"`, `"002"`, …) in first-occurrence order, rewriting every
/// dependency reference through the same mapping (P1). The sentinel
/// `"none"` dependency is left untouched.
pub fn renumber_sub_tasks(sub_tasks: &mut [SubTask]) {
    use std::collections::HashMap;

    let mapping: HashMap<String, String> = sub_tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), format!("{:03}", i + 1)))
        .collect();

    for task in sub_tasks.iter_mut() {
        task.id = mapping
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| task.id.clone());
        for dep in task.dependencies.iter_mut() {
            if dep == NO_DEPENDENCIES {
                continue;
            }
            if let Some(renamed) = mapping.get(dep) {
                *dep = renamed.clone();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DAG
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagStatus {
    Success,
    Pending,
    ValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningAttemptReason {
    Initial,
    RetryGaps,
    RetryParseError,
    RetryValidation,
    TitleMaster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningAttempt {
    pub reason: PlanningAttemptReason,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub cost_usd: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub id: String,
    pub status: DagStatus,
    /// The structured `Plan` on success, or the raw rejected LLM response on
    /// `validation_error` / `pending`.
    pub result: Value,
    pub params: Value,
    pub agent_name: String,
    pub dag_title: Option<String>,
    pub cron_schedule: Option<String>,
    pub schedule_active: Option<bool>,
    pub timezone: Option<String>,
    pub planning_total_usage: Usage,
    pub planning_total_cost_usd: Option<String>,
    pub planning_attempts: Vec<PlanningAttempt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// DagExecution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Partial,
    Suspended,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounts {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub running: u32,
    pub waiting: u32,
    pub pending: u32,
}

/// Derive `DagExecution.status` from sub-step counts (§4.2 `deriveExecutionStatus`).
pub fn derive_execution_status(counts: TaskCounts) -> ExecutionStatus {
    if counts.waiting > 0 {
        return ExecutionStatus::Waiting;
    }
    if counts.failed > 0 && counts.completed + counts.failed == counts.total {
        return if counts.failed == counts.total {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Partial
        };
    }
    if counts.completed == counts.total && counts.total > 0 {
        return ExecutionStatus::Completed;
    }
    if counts.running > 0 || counts.completed > 0 {
        return ExecutionStatus::Running;
    }
    ExecutionStatus::Pending
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagExecution {
    pub id: String,
    pub dag_id: Option<String>,
    pub original_request: String,
    pub primary_intent: String,
    pub status: ExecutionStatus,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    pub waiting_tasks: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub final_result: Option<Value>,
    pub synthesis_result: Option<Value>,
    pub suspended_reason: Option<String>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub total_usage: Option<Usage>,
    pub total_cost_usd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DagExecution {
    pub fn new(id: String, dag_id: Option<String>, original_request: String, primary_intent: String, total_tasks: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            dag_id,
            original_request,
            primary_intent,
            status: ExecutionStatus::Pending,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
            waiting_tasks: 0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            final_result: None,
            synthesis_result: None,
            suspended_reason: None,
            suspended_at: None,
            retry_count: 0,
            last_retry_at: None,
            total_usage: None,
            total_cost_usd: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// SubStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStepStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStep {
    pub id: String,
    pub execution_id: String,
    pub task_id: String,
    pub description: String,
    pub thought: String,
    pub action_type: ActionType,
    pub tool_or_prompt_name: String,
    pub tool_or_prompt_params: Option<Value>,
    pub dependencies: Vec<String>,
    pub status: SubStepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
    pub cost_usd: Option<String>,
    pub generation_stats: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubStep {
    pub fn from_sub_task(execution_id: &str, task: &SubTask) -> Self {
        let now = Utc::now();
        Self {
            id: new_substep_id(),
            execution_id: execution_id.to_string(),
            task_id: task.id.clone(),
            description: task.description.clone(),
            thought: task.thought.clone(),
            action_type: task.action_type,
            tool_or_prompt_name: task.tool_or_prompt.name.clone(),
            tool_or_prompt_params: task.tool_or_prompt.params.clone(),
            dependencies: task.dependencies.clone(),
            status: SubStepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
            usage: None,
            cost_usd: None,
            generation_stats: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn synthesis(execution_id: &str, dependencies: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_substep_id(),
            execution_id: execution_id.to_string(),
            task_id: SYNTHESIS_TASK_ID.to_string(),
            description: "Synthesize final report".to_string(),
            thought: String::new(),
            action_type: ActionType::Inference,
            tool_or_prompt_name: "synthesis".to_string(),
            tool_or_prompt_params: None,
            dependencies,
            status: SubStepStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
            usage: None,
            cost_usd: None,
            generation_stats: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
            || (self.dependencies.len() == 1 && self.dependencies[0] == NO_DEPENDENCIES)
    }
}

// ---------------------------------------------------------------------------
// StopRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRequestStatus {
    Requested,
    Handled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub id: String,
    pub dag_id: Option<String>,
    pub execution_id: Option<String>,
    pub status: StopRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub handled_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub version: i64,
    pub prompt_template: String,
    pub provider: String,
    pub model: String,
    pub active: bool,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> SubTask {
        SubTask {
            id: id.to_string(),
            description: "d".into(),
            thought: "t".into(),
            action_type: ActionType::Tool,
            tool_or_prompt: ToolOrPrompt { name: "shell".into(), params: None },
            expected_output: "o".into(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn renumber_is_contiguous_and_rewrites_dependencies() {
        let mut tasks = vec![
            task("task_a", &["none"]),
            task("task_b", &["task_a"]),
            task("task_a_2", &["task_a", "task_b"]),
        ];
        renumber_sub_tasks(&mut tasks);
        assert_eq!(tasks[0].id, "001");
        assert_eq!(tasks[1].id, "002");
        assert_eq!(tasks[2].id, "003");
        assert_eq!(tasks[1].dependencies, vec!["001".to_string()]);
        assert_eq!(tasks[2].dependencies, vec!["001".to_string(), "002".to_string()]);
        assert_eq!(tasks[0].dependencies, vec!["none".to_string()]);
    }

    #[test]
    fn status_derivation_matches_spec_truth_table() {
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, waiting: 1, ..Default::default() }),
            ExecutionStatus::Waiting
        );
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, failed: 3, ..Default::default() }),
            ExecutionStatus::Failed
        );
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, failed: 1, completed: 2, ..Default::default() }),
            ExecutionStatus::Partial
        );
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, completed: 3, ..Default::default() }),
            ExecutionStatus::Completed
        );
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, running: 1, completed: 1, ..Default::default() }),
            ExecutionStatus::Running
        );
        assert_eq!(
            derive_execution_status(TaskCounts { total: 3, pending: 3, ..Default::default() }),
            ExecutionStatus::Pending
        );
    }

    #[test]
    fn cost_aggregation_sums_and_is_none_when_empty() {
        let costs: Vec<Option<&str>> = vec![Some("1.50"), None, Some("0.25")];
        let total = aggregate_cost(costs).unwrap();
        assert_eq!(total, Decimal::from_str("1.75").unwrap());

        let empty: Vec<Option<&str>> = vec![None, None];
        assert!(aggregate_cost(empty).is_none());
    }
}
