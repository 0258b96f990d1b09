//! The Planner (§4.1): drives an LLM decomposition agent, enforces a bounded
//! retry loop with three distinct failure modes (parse, schema, coverage),
//! and persists a typed plan. Every outcome — including terminal failures —
//! persists a `Dag` row, so the caller always gets a stable handle.

use crate::llm::{ChatMessage, ChatRequest, LLMProvider};
use crate::scheduler::validate_cron;
use dagflow_kernel::model::{
    new_dag_id, renumber_sub_tasks, Coverage, Dag, DagStatus, PlanningAttempt,
    PlanningAttemptReason, Usage,
};
use dagflow_kernel::tool::AbortSignal;
use dagflow_kernel::{DagFlowError, DagFlowResult, Store, ToolRegistry};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_ATTEMPTS: u32 = 3;
const MIN_SYSTEM_PROMPT_LEN: usize = 100;
const MAX_RESPONSE_CHARS: usize = 100_000;
const AGENT_CACHE_TTL: Duration = Duration::from_secs(60);
const AGENT_CACHE_CAP: usize = 50;
const TITLE_MAX_TOKENS: u32 = 100;

/// The planner's three-variant outcome, every variant carrying `dag_id` so
/// downstream code can branch exhaustively while always having a handle
/// (§9 "Plan as tagged union").
#[derive(Debug, Clone)]
pub enum PlanningResult {
    Success { dag_id: String },
    ClarificationRequired { dag_id: String, query: String },
    ValidationError { dag_id: String },
}

impl PlanningResult {
    pub fn dag_id(&self) -> &str {
        match self {
            Self::Success { dag_id }
            | Self::ClarificationRequired { dag_id, .. }
            | Self::ValidationError { dag_id } => dag_id,
        }
    }

    fn retagged(self, dag_id: String) -> Self {
        match self {
            Self::Success { .. } => Self::Success { dag_id },
            Self::ClarificationRequired { query, .. } => Self::ClarificationRequired { dag_id, query },
            Self::ValidationError { .. } => Self::ValidationError { dag_id },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateFromGoalOptions {
    pub goal_text: String,
    pub agent_name: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
    pub cron_schedule: Option<String>,
    pub schedule_active: Option<bool>,
    pub timezone: String,
    pub abort: Option<AbortSignal>,
}

impl Default for CreateFromGoalOptions {
    fn default() -> Self {
        Self {
            goal_text: String::new(),
            agent_name: String::new(),
            provider: None,
            model: None,
            temperature: 0.7,
            max_tokens: 10_000,
            seed: None,
            cron_schedule: None,
            schedule_active: None,
            timezone: "UTC".to_string(),
            abort: None,
        }
    }
}

struct AgentCacheEntry {
    agent: dagflow_kernel::model::Agent,
    inserted_at: Instant,
}

/// Process-wide LRU/TTL cache over `Store::get_active_agent` (§4.1 step 1,
/// §5: TTL 60s, cap 50, invalidated on any write that touches active-status).
struct AgentCache {
    entries: Mutex<HashMap<String, AgentCacheEntry>>,
}

impl AgentCache {
    fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, name: &str) -> Option<dagflow_kernel::model::Agent> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some(e) if e.inserted_at.elapsed() < AGENT_CACHE_TTL => Some(e.agent.clone()),
            Some(_) => {
                entries.remove(name);
                None
            }
            None => None,
        }
    }

    fn insert(&self, name: &str, agent: dagflow_kernel::model::Agent) {
        let mut entries = self.entries.lock();
        if entries.len() >= AGENT_CACHE_CAP && !entries.contains_key(name) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(name.to_string(), AgentCacheEntry { agent, inserted_at: Instant::now() });
    }

    fn invalidate(&self, name: &str) {
        self.entries.lock().remove(name);
    }
}

pub struct Planner {
    store: Arc<dyn Store>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    agent_cache: AgentCache,
}

impl Planner {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LLMProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self { store, llm, tools, agent_cache: AgentCache::new() }
    }

    /// Invalidate the agent cache entry for `name` — callers that mutate
    /// agent rows (activation, versioning) must call this (§5).
    pub fn invalidate_agent_cache(&self, name: &str) {
        self.agent_cache.invalidate(name);
    }

    async fn resolve_agent(&self, name: &str) -> DagFlowResult<dagflow_kernel::model::Agent> {
        if let Some(agent) = self.agent_cache.get(name) {
            return Ok(agent);
        }
        let agent = self
            .store
            .get_active_agent(name)
            .await?
            .ok_or_else(|| DagFlowError::configuration(format!("no active agent named '{name}'")))?;
        self.agent_cache.insert(name, agent.clone());
        Ok(agent)
    }

    async fn stop_requested(&self, dag_id: &str, abort: Option<&AbortSignal>) -> DagFlowResult<bool> {
        if abort.is_some_and(AbortSignal::is_aborted) {
            return Ok(true);
        }
        self.store.has_active_stop_for_dag(dag_id).await
    }

    pub async fn create_from_goal(&self, opts: CreateFromGoalOptions) -> DagFlowResult<PlanningResult> {
        if let Some(cron) = &opts.cron_schedule {
            validate_cron(cron)?;
        }

        let agent = self.resolve_agent(&opts.agent_name).await?;

        let tools_json =
            serde_json::to_string(&self.tools.definitions_json()).unwrap_or_else(|_| "[]".to_string());
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let system_prompt = agent
            .prompt_template
            .replace("{{tools}}", &tools_json)
            .replace("{{currentDate}}", &today);
        if system_prompt.chars().count() < MIN_SYSTEM_PROMPT_LEN {
            return Err(DagFlowError::configuration(
                "agent prompt template expands below the minimum length — misconfigured template",
            ));
        }

        let dag_id = new_dag_id();
        let now = chrono::Utc::now();
        self.store
            .insert_dag(Dag {
                id: dag_id.clone(),
                status: DagStatus::Pending,
                result: Value::Null,
                params: serde_json::json!({
                    "goalText": opts.goal_text,
                    "provider": opts.provider,
                    "model": opts.model,
                    "temperature": opts.temperature,
                    "maxTokens": opts.max_tokens,
                    "seed": opts.seed,
                }),
                agent_name: opts.agent_name.clone(),
                dag_title: None,
                cron_schedule: opts.cron_schedule.clone(),
                schedule_active: opts.schedule_active,
                timezone: Some(opts.timezone.clone()),
                planning_total_usage: Usage::default(),
                planning_total_cost_usd: None,
                planning_attempts: vec![],
                created_at: now,
                updated_at: now,
            })
            .await?;

        match self.run_retry_loop(&dag_id, &system_prompt, &opts).await {
            Ok(result) => Ok(result),
            Err(err) if matches!(err, DagFlowError::Abort) => {
                // Stop observed mid-loop: delete the partial row, mark handled.
                let _ = self.store.delete_dag(&dag_id).await;
                self.store.mark_stop_handled_for_dag(&dag_id).await?;
                Ok(PlanningResult::ValidationError { dag_id })
            }
            Err(err) => Err(err),
        }
    }

    async fn run_retry_loop(
        &self,
        dag_id: &str,
        system_prompt: &str,
        opts: &CreateFromGoalOptions,
    ) -> DagFlowResult<PlanningResult> {
        let mut user_prompt = opts.goal_text.clone();
        let mut attempts: Vec<PlanningAttempt> = Vec::new();
        let mut total_usage = Usage::default();
        let mut total_cost: Option<Decimal> = None;

        for attempt_idx in 0..MAX_ATTEMPTS {
            if self.stop_requested(dag_id, opts.abort.as_ref()).await? {
                return Err(DagFlowError::Abort);
            }

            let response = self
                .llm
                .chat(ChatRequest {
                    messages: vec![
                        ChatMessage::system(system_prompt),
                        ChatMessage::user(&user_prompt),
                    ],
                    temperature: Some(opts.temperature),
                    max_tokens: Some(opts.max_tokens),
                    seed: opts.seed,
                    abort: opts.abort.clone(),
                })
                .await
                .map_err(|e| DagFlowError::LlmTransport(e.to_string()))?;

            if let Some(u) = &response.usage {
                total_usage.add(u);
            }
            if let Some(c) = response.cost_usd.as_deref().and_then(|s| Decimal::from_str(s).ok()) {
                total_cost = Some(total_cost.unwrap_or(Decimal::ZERO) + c);
            }

            let is_last = attempt_idx + 1 == MAX_ATTEMPTS;

            if response.content.chars().count() > MAX_RESPONSE_CHARS {
                attempts.push(PlanningAttempt {
                    reason: attempt_reason(attempt_idx),
                    usage: response.usage,
                    cost_usd: response.cost_usd.clone(),
                    error: Some("response exceeded the 100,000 char ceiling".to_string()),
                });
                if is_last {
                    return self
                        .finalize_validation_error(dag_id, total_usage, total_cost, attempts, Value::String(response.content))
                        .await;
                }
                continue;
            }

            let parsed = match crate::llm::parse_llm_json(&response.content) {
                Ok(v) => v,
                Err(e) => {
                    attempts.push(PlanningAttempt {
                        reason: PlanningAttemptReason::RetryParseError,
                        usage: response.usage,
                        cost_usd: response.cost_usd.clone(),
                        error: Some(e.to_string()),
                    });
                    if is_last {
                        return self
                            .finalize_validation_error(dag_id, total_usage, total_cost, attempts, Value::String(response.content))
                            .await;
                    }
                    continue;
                }
            };

            if let Err(e) = dagflow_kernel::schema::validate_against_schema(&parsed, &plan_schema()) {
                attempts.push(PlanningAttempt {
                    reason: PlanningAttemptReason::RetryValidation,
                    usage: response.usage,
                    cost_usd: response.cost_usd.clone(),
                    error: Some(e),
                });
                if is_last {
                    return self
                        .finalize_validation_error(dag_id, total_usage, total_cost, attempts, parsed)
                        .await;
                }
                continue;
            }

            let plan: dagflow_kernel::model::Plan = match serde_json::from_value(parsed.clone()) {
                Ok(p) => p,
                Err(e) => {
                    attempts.push(PlanningAttempt {
                        reason: PlanningAttemptReason::RetryValidation,
                        usage: response.usage,
                        cost_usd: response.cost_usd.clone(),
                        error: Some(e.to_string()),
                    });
                    if is_last {
                        return self
                            .finalize_validation_error(dag_id, total_usage, total_cost, attempts, parsed)
                            .await;
                    }
                    continue;
                }
            };

            if plan.clarification_needed {
                let query = plan.clarification_query.clone().unwrap_or_default();
                return self
                    .finalize_clarification(dag_id, opts, &plan, total_usage, total_cost, attempts, query)
                    .await;
            }

            if plan.validation.coverage == Coverage::High {
                return self
                    .finalize_success(dag_id, opts, plan, total_usage, total_cost, attempts)
                    .await;
            }

            if !plan.validation.gaps.is_empty() {
                user_prompt = format!(
                    "{}\n\nYour previous plan left gaps. Address the following before replying:\n- {}",
                    opts.goal_text,
                    plan.validation.gaps.join("\n- ")
                );
                attempts.push(PlanningAttempt {
                    reason: PlanningAttemptReason::RetryGaps,
                    usage: response.usage,
                    cost_usd: response.cost_usd.clone(),
                    error: None,
                });
                if is_last {
                    // Out of retries — persist what we have rather than a bare error.
                    return self
                        .finalize_success(dag_id, opts, plan, total_usage, total_cost, attempts)
                        .await;
                }
                continue;
            }

            // Medium/low coverage, no gaps reported: persist as-is (§4.1 step i).
            return self
                .finalize_success(dag_id, opts, plan, total_usage, total_cost, attempts)
                .await;
        }

        Err(DagFlowError::validation("exceeded max planning attempts"))
    }

    async fn finalize_validation_error(
        &self,
        dag_id: &str,
        total_usage: Usage,
        total_cost: Option<Decimal>,
        attempts: Vec<PlanningAttempt>,
        raw_result: Value,
    ) -> DagFlowResult<PlanningResult> {
        let mut dag = self
            .store
            .get_dag(dag_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(dag_id))?;
        dag.status = DagStatus::ValidationError;
        dag.result = raw_result;
        dag.planning_total_usage = total_usage;
        dag.planning_total_cost_usd = total_cost.map(|c| c.to_string());
        dag.planning_attempts = attempts;
        dag.updated_at = chrono::Utc::now();
        self.store.update_dag(dag).await?;
        Ok(PlanningResult::ValidationError { dag_id: dag_id.to_string() })
    }

    async fn finalize_clarification(
        &self,
        dag_id: &str,
        opts: &CreateFromGoalOptions,
        plan: &dagflow_kernel::model::Plan,
        total_usage: Usage,
        total_cost: Option<Decimal>,
        mut attempts: Vec<PlanningAttempt>,
        query: String,
    ) -> DagFlowResult<PlanningResult> {
        let title = self.generate_title(&opts.goal_text, &mut attempts).await;

        let mut dag = self
            .store
            .get_dag(dag_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(dag_id))?;
        dag.status = DagStatus::Pending;
        dag.result = serde_json::to_value(plan).unwrap_or(Value::Null);
        dag.dag_title = title;
        dag.planning_total_usage = total_usage;
        dag.planning_total_cost_usd = total_cost.map(|c| c.to_string());
        dag.planning_attempts = attempts;
        dag.updated_at = chrono::Utc::now();
        self.store.update_dag(dag).await?;
        Ok(PlanningResult::ClarificationRequired { dag_id: dag_id.to_string(), query })
    }

    async fn finalize_success(
        &self,
        dag_id: &str,
        opts: &CreateFromGoalOptions,
        mut plan: dagflow_kernel::model::Plan,
        total_usage: Usage,
        total_cost: Option<Decimal>,
        mut attempts: Vec<PlanningAttempt>,
    ) -> DagFlowResult<PlanningResult> {
        renumber_sub_tasks(&mut plan.sub_tasks);
        plan.original_request = opts.goal_text.clone();

        let title = self.generate_title(&opts.goal_text, &mut attempts).await;

        let mut dag = self
            .store
            .get_dag(dag_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(dag_id))?;
        dag.status = DagStatus::Success;
        dag.result = serde_json::to_value(&plan).unwrap_or(Value::Null);
        dag.dag_title = title;
        dag.planning_total_usage = total_usage;
        dag.planning_total_cost_usd = total_cost.map(|c| c.to_string());
        dag.planning_attempts = attempts;
        if let Some(cron) = &opts.cron_schedule {
            validate_cron(cron)?;
            dag.cron_schedule = Some(cron.clone());
            dag.schedule_active = Some(opts.schedule_active.unwrap_or(true));
        }
        dag.updated_at = chrono::Utc::now();
        self.store.update_dag(dag).await?;
        Ok(PlanningResult::Success { dag_id: dag_id.to_string() })
    }

    /// TitleMaster side-call (§4.1): an independently failing LLM call to
    /// produce a short title. Failure is non-fatal — logged, title null.
    async fn generate_title(&self, goal_text: &str, attempts: &mut Vec<PlanningAttempt>) -> Option<String> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You are TitleMaster. Produce a short, human-readable title (at most a dozen words) \
                     for the following goal. Respond with the title text only.",
                ),
                ChatMessage::user(goal_text),
            ],
            temperature: Some(0.3),
            max_tokens: Some(TITLE_MAX_TOKENS),
            seed: None,
            abort: None,
        };
        match self.llm.chat(request).await {
            Ok(response) => {
                attempts.push(PlanningAttempt {
                    reason: PlanningAttemptReason::TitleMaster,
                    usage: response.usage,
                    cost_usd: response.cost_usd.clone(),
                    error: None,
                });
                let title = response.content.trim().to_string();
                if title.is_empty() {
                    None
                } else {
                    Some(title)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "TitleMaster call failed; leaving dag_title null");
                attempts.push(PlanningAttempt {
                    reason: PlanningAttemptReason::TitleMaster,
                    usage: None,
                    cost_usd: None,
                    error: Some(e.to_string()),
                });
                None
            }
        }
    }

    /// Resume a DAG awaiting clarification (§4.1, §6). May be called at most
    /// once per DAG — a DAG not in `pending` status is rejected.
    pub async fn resume_from_clarification(&self, dag_id: &str, user_answer: &str) -> DagFlowResult<PlanningResult> {
        let dag = self
            .store
            .get_dag(dag_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(dag_id))?;
        if dag.status != DagStatus::Pending {
            return Err(DagFlowError::validation(format!(
                "dag '{dag_id}' is not awaiting clarification"
            )));
        }

        // `finalize_clarification` persists the raw LLM `Plan` without setting
        // `original_request` (only `finalize_success` does) — the guaranteed
        // copy of the user's goal lives in `params.goalText` from insert time.
        let original_goal = dag
            .params
            .get("goalText")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let merged_goal = format!("{original_goal}\nUser clarification: {user_answer}");

        let scratch_result = self
            .create_from_goal(CreateFromGoalOptions {
                goal_text: merged_goal,
                agent_name: dag.agent_name.clone(),
                timezone: dag.timezone.clone().unwrap_or_else(|| "UTC".to_string()),
                ..Default::default()
            })
            .await?;

        let scratch_id = scratch_result.dag_id().to_string();
        let mut scratch_dag = self
            .store
            .get_dag(&scratch_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(&scratch_id))?;
        scratch_dag.id = dag_id.to_string();
        self.store.update_dag(scratch_dag).await?;
        self.store.delete_dag(&scratch_id).await.ok();

        Ok(scratch_result.retagged(dag_id.to_string()))
    }

    /// List every DAG carrying a cron schedule, summarized for a scheduling
    /// UI (§6 `listScheduled`).
    pub async fn list_scheduled(&self) -> DagFlowResult<Vec<crate::scheduler::ScheduledDagSummary>> {
        let dags = self.store.list_scheduled_dags().await?;
        Ok(crate::scheduler::summarize_scheduled(&dags))
    }

    /// Patch a subset of a DAG's mutable fields (§6 `update`). Re-validates
    /// a new cron expression before persisting it; leaves everything else
    /// untouched when its corresponding field is `None`.
    pub async fn update(&self, dag_id: &str, fields: DagUpdateFields) -> DagFlowResult<Dag> {
        let mut dag = self.store.get_dag(dag_id).await?.ok_or_else(|| DagFlowError::not_found(dag_id))?;
        if let Some(title) = fields.dag_title {
            dag.dag_title = title;
        }
        if let Some(cron) = fields.cron_schedule {
            if let Some(ref expr) = cron {
                validate_cron(expr)?;
            }
            dag.cron_schedule = cron;
        }
        if let Some(active) = fields.schedule_active {
            dag.schedule_active = active;
        }
        if let Some(timezone) = fields.timezone {
            dag.timezone = timezone;
        }
        dag.updated_at = chrono::Utc::now();
        self.store.update_dag(dag.clone()).await?;
        Ok(dag)
    }

    /// Delete a DAG unless some execution still references it (§6
    /// `safeDelete`); the referential-integrity check itself lives in the
    /// store's `delete_dag`.
    pub async fn safe_delete(&self, dag_id: &str) -> DagFlowResult<()> {
        self.store.delete_dag(dag_id).await
    }
}

/// Patch payload for [`Planner::update`]. Every field is `Option<Option<T>>`
/// where the outer `None` means "leave untouched" and the inner `None`
/// means "clear this field" (relevant for `cron_schedule`).
#[derive(Debug, Clone, Default)]
pub struct DagUpdateFields {
    pub dag_title: Option<Option<String>>,
    pub cron_schedule: Option<Option<String>>,
    pub schedule_active: Option<Option<bool>>,
    pub timezone: Option<Option<String>>,
}

fn attempt_reason(attempt_idx: u32) -> PlanningAttemptReason {
    if attempt_idx == 0 {
        PlanningAttemptReason::Initial
    } else {
        PlanningAttemptReason::RetryParseError
    }
}

fn plan_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["intent", "validation", "sub_tasks"],
        "properties": {
            "intent": {"type": "object", "required": ["primary"]},
            "validation": {
                "type": "object",
                "required": ["coverage"],
                "properties": {"coverage": {"type": "string", "enum": ["high", "medium", "low"]}}
            },
            "sub_tasks": {"type": "array"}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, FinishReason};
    use async_trait::async_trait;
    use dagflow_kernel::model::Agent;
    use dagflow_kernel::storage::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: ChatRequest) -> DagFlowResult<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            let content = if responses.is_empty() {
                "Scripted Title".to_string()
            } else {
                responses.remove(0)
            };
            Ok(ChatResponse {
                content,
                usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 }),
                cost_usd: Some("0.01".to_string()),
                generation_stats: None,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    async fn seeded_store_with_agent() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_agent(Agent {
                id: "agent_1".into(),
                name: "decomposer".into(),
                version: 1,
                prompt_template: "You decompose goals. Tools: {{tools}} Today is {{currentDate}}. Be exhaustive and thorough in every decomposition you produce for the user.".into(),
                provider: "anthropic".into(),
                model: "test-model".into(),
                active: true,
                metadata: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        store
    }

    fn high_coverage_plan_json() -> String {
        "```json\n{\"original_request\":\"\",\"intent\":{\"primary\":\"do thing\",\"sub_intents\":[]},\
        \"entities\":[],\"synthesis_plan\":\"combine\",\"validation\":{\"coverage\":\"high\",\"gaps\":[],\"iteration_triggers\":[]},\
        \"clarification_needed\":false,\"sub_tasks\":[{\"id\":\"task_a\",\"description\":\"d\",\"thought\":\"t\",\
        \"action_type\":\"tool\",\"tool_or_prompt\":{\"name\":\"shell\"},\"expected_output\":\"o\",\"dependencies\":[\"none\"]}]}\n```".to_string()
    }

    #[tokio::test]
    async fn high_coverage_plan_persists_success_and_renumbers() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![high_coverage_plan_json()]),
            calls: AtomicUsize::new(0),
        });
        let planner = Planner::new(store.clone(), provider, Arc::new(ToolRegistry::new()));

        let result = planner
            .create_from_goal(CreateFromGoalOptions {
                goal_text: "do the thing".into(),
                agent_name: "decomposer".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        match result {
            PlanningResult::Success { dag_id } => {
                let dag = store.get_dag(&dag_id).await.unwrap().unwrap();
                assert_eq!(dag.status, DagStatus::Success);
                let plan: dagflow_kernel::model::Plan = serde_json::from_value(dag.result).unwrap();
                assert_eq!(plan.sub_tasks[0].id, "001");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_response_persists_validation_error_after_retries() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec!["garbage".into(), "garbage".into(), "garbage".into()]),
            calls: AtomicUsize::new(0),
        });
        let planner = Planner::new(store.clone(), provider, Arc::new(ToolRegistry::new()));

        let result = planner
            .create_from_goal(CreateFromGoalOptions {
                goal_text: "do the thing".into(),
                agent_name: "decomposer".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        match result {
            PlanningResult::ValidationError { dag_id } => {
                let dag = store.get_dag(&dag_id).await.unwrap().unwrap();
                assert_eq!(dag.status, DagStatus::ValidationError);
                assert_eq!(dag.planning_attempts.len(), 3);
            }
            other => panic!("expected validation_error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_agent_is_a_configuration_error() {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(ScriptedProvider { responses: Mutex::new(vec![]), calls: AtomicUsize::new(0) });
        let planner = Planner::new(store, provider, Arc::new(ToolRegistry::new()));

        let err = planner
            .create_from_goal(CreateFromGoalOptions {
                goal_text: "goal".into(),
                agent_name: "nonexistent".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DagFlowError::Configuration(_)));
    }

    #[tokio::test]
    async fn invalid_cron_rejected_before_any_llm_call() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider { responses: Mutex::new(vec![]), calls: AtomicUsize::new(0) });
        let planner = Planner::new(store, provider.clone(), Arc::new(ToolRegistry::new()));

        let err = planner
            .create_from_goal(CreateFromGoalOptions {
                goal_text: "goal".into(),
                agent_name: "decomposer".into(),
                cron_schedule: Some("not a cron".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DagFlowError::Configuration(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_scheduled_only_returns_dags_with_a_cron() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider { responses: Mutex::new(vec![]), calls: AtomicUsize::new(0) });
        let planner = Planner::new(store.clone(), provider, Arc::new(ToolRegistry::new()));

        let mut unscheduled = dagflow_kernel::model::Dag {
            id: "dag_unscheduled".into(),
            status: DagStatus::Success,
            result: Value::Null,
            params: Value::Null,
            agent_name: "decomposer".into(),
            dag_title: None,
            cron_schedule: None,
            schedule_active: None,
            timezone: None,
            planning_total_usage: Usage::default(),
            planning_total_cost_usd: None,
            planning_attempts: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_dag(unscheduled.clone()).await.unwrap();
        unscheduled.id = "dag_scheduled".into();
        unscheduled.dag_title = Some("Nightly report".into());
        unscheduled.cron_schedule = Some("0 0 * * *".into());
        store.insert_dag(unscheduled).await.unwrap();

        let summaries = planner.list_scheduled().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "dag_scheduled");
        assert_eq!(summaries[0].title.as_deref(), Some("Nightly report"));
    }

    #[tokio::test]
    async fn update_rejects_a_malformed_replacement_cron() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider { responses: Mutex::new(vec![]), calls: AtomicUsize::new(0) });
        let planner = Planner::new(store.clone(), provider, Arc::new(ToolRegistry::new()));

        let dag = dagflow_kernel::model::Dag {
            id: "dag_1".into(),
            status: DagStatus::Success,
            result: Value::Null,
            params: Value::Null,
            agent_name: "decomposer".into(),
            dag_title: None,
            cron_schedule: None,
            schedule_active: None,
            timezone: None,
            planning_total_usage: Usage::default(),
            planning_total_cost_usd: None,
            planning_attempts: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_dag(dag).await.unwrap();

        let updated = planner
            .update(
                "dag_1",
                DagUpdateFields { dag_title: Some(Some("New title".into())), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(updated.dag_title.as_deref(), Some("New title"));

        let err = planner
            .update("dag_1", DagUpdateFields { cron_schedule: Some(Some("garbage".into())), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DagFlowError::Configuration(_)));
    }

    #[tokio::test]
    async fn safe_delete_removes_an_unreferenced_dag_but_blocks_a_referenced_one() {
        let store = seeded_store_with_agent().await;
        let provider = Arc::new(ScriptedProvider { responses: Mutex::new(vec![]), calls: AtomicUsize::new(0) });
        let planner = Planner::new(store.clone(), provider, Arc::new(ToolRegistry::new()));

        let mut dag = dagflow_kernel::model::Dag {
            id: "dag_1".into(),
            status: DagStatus::Success,
            result: Value::Null,
            params: Value::Null,
            agent_name: "decomposer".into(),
            dag_title: None,
            cron_schedule: None,
            schedule_active: None,
            timezone: None,
            planning_total_usage: Usage::default(),
            planning_total_cost_usd: None,
            planning_attempts: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_dag(dag.clone()).await.unwrap();
        assert!(planner.safe_delete("dag_1").await.is_ok());
        assert!(store.get_dag("dag_1").await.unwrap().is_none());

        dag.id = "dag_2".into();
        store.insert_dag(dag).await.unwrap();
        store
            .insert_execution(dagflow_kernel::model::DagExecution::new(
                "exec_1".into(),
                Some("dag_2".into()),
                "do the thing".into(),
                "do thing".into(),
                0,
            ))
            .await
            .unwrap();
        assert!(planner.safe_delete("dag_2").await.is_err());
    }
}
