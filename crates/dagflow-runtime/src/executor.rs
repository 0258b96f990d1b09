//! The Executor (§4.2): wave-scheduled concurrent DAG execution. A `Dag`'s
//! stored `Plan` is turned into a `DagExecution` plus one `SubStep` per
//! sub-task, then run to completion (or suspension, or a cooperative stop)
//! by repeatedly selecting the "ready" frontier and fanning it out on a
//! `tokio::task::JoinSet` — mirroring the teacher's own frontier/wave loop
//! in `message_graph/executor.rs`, generalized from a static message graph
//! to this engine's dynamically-typed sub-tasks.

use crate::tools::dependency::{self, DependencyResolver};
use dagflow_foundation::llm::{ChatMessage, ChatRequest, LLMProvider};
use dagflow_kernel::bus::{EventBus, EventType, ExecutionEvent};
use dagflow_kernel::model::{
    aggregate_cost, aggregate_usage, new_execution_id, new_substep_id, ActionType, Agent, DagExecution,
    DagStatus, ExecutionStatus, Plan, SubStep, SubStepStatus, SubTask, TaskCounts, Usage,
    NO_DEPENDENCIES, SYNTHESIS_TASK_ID,
};
use dagflow_kernel::tool::{AbortHandle, AbortSignal, EmittedTaskEvent, EventEmitter, ToolContext};
use dagflow_kernel::{DagFlowError, DagFlowResult, Store, ToolRegistry};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

const INFERENCE_DEPENDENCY_SNIPPET_CAP: usize = 2_000;

/// Resolves an agent's `(provider, model)` into a concrete LLM transport,
/// cached process-wide by the caller (§5: "LLM provider instances are cached
/// process-wide by `(provider, model, max_tokens, skip_stats)`").
#[async_trait::async_trait]
pub trait LlmResolver: Send + Sync {
    async fn resolve(&self, provider: &str, model: &str) -> DagFlowResult<Arc<dyn LLMProvider>>;
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    pub skip_events: bool,
    pub batch_db_updates: bool,
    pub abort: Option<AbortSignal>,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self { skip_events: false, batch_db_updates: true, abort: None }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub status: String,
    pub retry_count: Option<u32>,
}

pub struct Executor {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    tools: Arc<ToolRegistry>,
    llm_resolver: Arc<dyn LlmResolver>,
    default_llm: Arc<dyn LLMProvider>,
    artifacts_dir: PathBuf,
    dependency_resolvers: HashMap<&'static str, Box<dyn DependencyResolver>>,
}

impl Executor {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
        tools: Arc<ToolRegistry>,
        llm_resolver: Arc<dyn LlmResolver>,
        default_llm: Arc<dyn LLMProvider>,
        artifacts_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            tools,
            llm_resolver,
            default_llm,
            artifacts_dir,
            dependency_resolvers: dependency::strategy_table(),
        })
    }

    // -- API surface (§6) ---------------------------------------------------

    pub async fn execute(self: &Arc<Self>, dag_id: &str, config: ExecutionConfig) -> DagFlowResult<ExecutionHandle> {
        let dag = self
            .store
            .get_dag(dag_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(dag_id))?;
        if dag.status != DagStatus::Success {
            return Err(DagFlowError::validation(format!(
                "dag '{dag_id}' is not in success status"
            )));
        }

        let mut result_value = dag.result.clone();
        substitute_runtime_tokens(&mut result_value);
        dagflow_kernel::schema::validate_against_schema(&result_value, &plan_schema())
            .map_err(DagFlowError::validation)?;
        let plan: Plan = serde_json::from_value(result_value).map_err(DagFlowError::Serialization)?;

        if plan.clarification_needed {
            return Err(DagFlowError::validation(format!(
                "dag '{dag_id}' still awaits clarification"
            )));
        }

        let execution_id = new_execution_id();
        let execution = DagExecution::new(
            execution_id.clone(),
            Some(dag_id.to_string()),
            plan.original_request.clone(),
            plan.intent.primary.clone(),
            plan.sub_tasks.len() as u32,
        );
        self.store.insert_execution(execution).await?;

        let sub_steps: Vec<SubStep> = plan.sub_tasks.iter().map(|t| SubStep::from_sub_task(&execution_id, t)).collect();
        self.store.insert_sub_steps(sub_steps).await?;

        let this = Arc::clone(self);
        let spawned_execution_id = execution_id.clone();
        tokio::spawn(async move {
            this.run(&spawned_execution_id, plan, config, HashSet::new(), HashMap::new()).await;
        });

        Ok(ExecutionHandle { execution_id, status: "pending".to_string(), retry_count: None })
    }

    pub async fn resume(self: &Arc<Self>, execution_id: &str, config: ExecutionConfig) -> DagFlowResult<ExecutionHandle> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(execution_id))?;
        if !matches!(execution.status, ExecutionStatus::Suspended | ExecutionStatus::Failed) {
            return Err(DagFlowError::validation(format!(
                "execution '{execution_id}' is not resumable from status {:?}",
                execution.status
            )));
        }
        let dag_id = execution
            .dag_id
            .clone()
            .ok_or_else(|| DagFlowError::validation("execution has no associated dag to resume from"))?;
        let dag = self.store.get_dag(&dag_id).await?.ok_or_else(|| DagFlowError::not_found(&dag_id))?;
        let plan: Plan = serde_json::from_value(dag.result.clone()).map_err(DagFlowError::Serialization)?;

        let sub_steps = self.store.get_sub_steps(execution_id).await?;
        let executed: HashSet<String> = sub_steps
            .iter()
            .filter(|s| s.status == SubStepStatus::Completed)
            .map(|s| s.task_id.clone())
            .collect();
        let results: HashMap<String, Value> = sub_steps
            .iter()
            .filter(|s| s.status == SubStepStatus::Completed)
            .filter_map(|s| s.result.clone().map(|r| (s.task_id.clone(), r)))
            .collect();

        execution.retry_count += 1;
        execution.status = ExecutionStatus::Running;
        execution.last_retry_at = Some(chrono::Utc::now());
        execution.updated_at = chrono::Utc::now();
        let retry_count = execution.retry_count;
        self.store.update_execution(execution).await?;

        let this = Arc::clone(self);
        let spawned_execution_id = execution_id.to_string();
        tokio::spawn(async move {
            this.run(&spawned_execution_id, plan, config, executed, results).await;
        });

        Ok(ExecutionHandle { execution_id: execution_id.to_string(), status: "running".to_string(), retry_count: Some(retry_count) })
    }

    pub async fn get_sub_steps(&self, execution_id: &str) -> DagFlowResult<Vec<SubStep>> {
        self.store.get_sub_steps(execution_id).await
    }

    pub async fn list(&self, dag_id: Option<&str>) -> DagFlowResult<Vec<DagExecution>> {
        self.store.list_executions(dag_id).await
    }

    pub async fn get(&self, id: &str) -> DagFlowResult<Option<DagExecution>> {
        self.store.get_execution(id).await
    }

    pub async fn get_with_sub_steps(&self, id: &str) -> DagFlowResult<Option<(DagExecution, Vec<SubStep>)>> {
        let Some(execution) = self.store.get_execution(id).await? else { return Ok(None) };
        let sub_steps = self.store.get_sub_steps(id).await?;
        Ok(Some((execution, sub_steps)))
    }

    pub async fn delete(&self, id: &str) -> DagFlowResult<()> {
        self.store.delete_execution(id).await
    }

    // -- The wave loop --------------------------------------------------------

    async fn run(
        self: Arc<Self>,
        execution_id: &str,
        plan: Plan,
        config: ExecutionConfig,
        mut executed: HashSet<String>,
        mut results: HashMap<String, Value>,
    ) {
        if let Err(e) = self.run_inner(execution_id, &plan, &config, &mut executed, &mut results).await {
            tracing::error!(execution_id, error = %e, "execution run failed unexpectedly");
            let _ = self.suspend(execution_id, &config, &e.to_string(), None).await;
        }
    }

    async fn run_inner(
        self: &Arc<Self>,
        execution_id: &str,
        plan: &Plan,
        config: &ExecutionConfig,
        executed: &mut HashSet<String>,
        results: &mut HashMap<String, Value>,
    ) -> DagFlowResult<()> {
        self.mark_running(execution_id).await?;
        self.emit(execution_id, config, EventType::Started, None);

        let agent_map = self.prefetch_agents(plan).await?;
        let mut sub_steps_by_task = self.load_sub_steps_by_task(execution_id).await?;

        let total = plan.sub_tasks.len();
        let mut wave = 0u32;

        while executed.len() < total {
            if self.store.has_active_stop_for_execution(execution_id).await? {
                self.handle_stop_during_execution(execution_id, config, &mut sub_steps_by_task).await?;
                return Ok(());
            }

            wave += 1;
            let ready: Vec<&SubTask> = plan
                .sub_tasks
                .iter()
                .filter(|t| !executed.contains(&t.id) && task_ready(t, executed))
                .collect();

            if ready.is_empty() {
                let remaining: Vec<String> = plan
                    .sub_tasks
                    .iter()
                    .filter(|t| !executed.contains(&t.id))
                    .map(|t| t.id.clone())
                    .collect();
                return Err(DagFlowError::Deadlock(remaining));
            }

            let ready_ids: Vec<String> = ready.iter().map(|t| t.id.clone()).collect();
            self.emit(
                execution_id,
                config,
                EventType::WaveStarted,
                Some(json!({"wave": wave, "taskIds": ready_ids, "parallel": ready.len()})),
            );

            for task in &ready {
                if let Some(step) = sub_steps_by_task.get_mut(&task.id) {
                    step.status = SubStepStatus::Running;
                    step.started_at = Some(chrono::Utc::now());
                    step.updated_at = chrono::Utc::now();
                }
            }
            if config.batch_db_updates {
                let updates: Vec<SubStep> = ready.iter().filter_map(|t| sub_steps_by_task.get(&t.id).cloned()).collect();
                self.store.update_sub_steps(updates).await?;
            }
            for task in &ready {
                self.emit(execution_id, config, EventType::TaskStarted, Some(json!({"taskId": task.id})));
            }

            let results_snapshot = results.clone();
            let mut join_set = tokio::task::JoinSet::new();
            for task in ready.iter().map(|t| (*t).clone()).collect::<Vec<_>>() {
                let this = Arc::clone(self);
                let execution_id = execution_id.to_string();
                let agent_map = Arc::clone(&agent_map);
                let sub_step_id = sub_steps_by_task
                    .get(&task.id)
                    .map(|s| s.id.clone())
                    .unwrap_or_else(new_substep_id);
                let results_snapshot = results_snapshot.clone();
                let abort = config.abort.clone().unwrap_or_else(|| AbortHandle::new().1);
                join_set.spawn(async move {
                    this.execute_task(&execution_id, &sub_step_id, &task, &agent_map, &results_snapshot, abort).await
                });
            }

            let mut wave_outcomes = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => wave_outcomes.push(outcome),
                    Err(join_err) => {
                        return Err(DagFlowError::Internal(format!("task join error: {join_err}")));
                    }
                }
            }

            let mut failure: Option<String> = None;
            for outcome in &wave_outcomes {
                let step = sub_steps_by_task
                    .entry(outcome.task_id.clone())
                    .or_insert_with(|| SubStep::from_sub_task(execution_id, plan.sub_tasks.iter().find(|t| t.id == outcome.task_id).unwrap()));
                match &outcome.kind {
                    TaskOutcomeKind::Completed { result, usage, cost_usd, generation_stats } => {
                        step.status = SubStepStatus::Completed;
                        step.completed_at = Some(chrono::Utc::now());
                        step.duration_ms = Some(outcome.duration_ms);
                        step.result = Some(result.clone());
                        step.usage = usage.clone();
                        step.cost_usd = cost_usd.clone();
                        step.generation_stats = generation_stats.clone();
                        step.updated_at = chrono::Utc::now();
                        executed.insert(outcome.task_id.clone());
                        results.insert(outcome.task_id.clone(), result.clone());
                        self.emit(
                            execution_id,
                            config,
                            EventType::TaskCompleted,
                            Some(json!({"taskId": outcome.task_id, "durationMs": outcome.duration_ms})),
                        );
                    }
                    TaskOutcomeKind::Aborted => {
                        step.status = SubStepStatus::Pending;
                        step.started_at = None;
                        step.updated_at = chrono::Utc::now();
                    }
                    TaskOutcomeKind::Failed { error } => {
                        step.status = SubStepStatus::Failed;
                        step.completed_at = Some(chrono::Utc::now());
                        step.duration_ms = Some(outcome.duration_ms);
                        step.error = Some(error.clone());
                        step.updated_at = chrono::Utc::now();
                        self.store.update_sub_step(step.clone()).await?;
                        self.emit(
                            execution_id,
                            config,
                            EventType::TaskFailed,
                            Some(json!({"taskId": outcome.task_id, "error": error})),
                        );
                        failure.get_or_insert_with(|| error.clone());
                    }
                }
            }

            if config.batch_db_updates {
                let completed_updates: Vec<SubStep> = wave_outcomes
                    .iter()
                    .filter(|o| matches!(o.kind, TaskOutcomeKind::Completed { .. } | TaskOutcomeKind::Aborted))
                    .filter_map(|o| sub_steps_by_task.get(&o.task_id).cloned())
                    .collect();
                self.store.update_sub_steps(completed_updates).await?;
            } else {
                for outcome in &wave_outcomes {
                    if !matches!(outcome.kind, TaskOutcomeKind::Failed { .. }) {
                        if let Some(step) = sub_steps_by_task.get(&outcome.task_id) {
                            self.store.update_sub_step(step.clone()).await?;
                        }
                    }
                }
            }

            self.emit(
                execution_id,
                config,
                EventType::WaveCompleted,
                Some(json!({"wave": wave, "completedTasks": executed.len(), "totalTasks": total})),
            );

            if let Some(error) = failure {
                self.suspend(execution_id, config, &error, Some(&sub_steps_by_task)).await?;
                return Ok(());
            }

            if self.store.has_active_stop_for_execution(execution_id).await? {
                self.handle_stop_during_execution(execution_id, config, &mut sub_steps_by_task).await?;
                return Ok(());
            }
        }

        self.run_synthesis(execution_id, plan, config, &sub_steps_by_task, results).await
    }

    async fn execute_task(
        self: &Arc<Self>,
        execution_id: &str,
        sub_step_id: &str,
        task: &SubTask,
        agent_map: &HashMap<String, Agent>,
        results: &HashMap<String, Value>,
        abort: AbortSignal,
    ) -> TaskOutcome {
        let started = std::time::Instant::now();
        let bus = Arc::clone(&self.bus);
        let execution_id_owned = execution_id.to_string();
        let emitter = EventEmitter::new(move |event| match event {
            EmittedTaskEvent::Progress(message) => {
                bus.publish(
                    ExecutionEvent::new(EventType::TaskProgress, &execution_id_owned, now_millis())
                        .with_data(json!({"message": message})),
                );
            }
            EmittedTaskEvent::Completed(message) => {
                bus.publish(
                    ExecutionEvent::new(EventType::TaskProgress, &execution_id_owned, now_millis())
                        .with_data(json!({"message": message, "final": true})),
                );
            }
        });

        let outcome = if is_inference(task) {
            self.execute_inference_task(task, agent_map, results, &abort).await
        } else {
            self.execute_tool_task(execution_id, sub_step_id, task, results, &abort, emitter).await
        };

        let duration_ms = started.elapsed().as_millis() as i64;
        match outcome {
            Ok(TaskSuccess { result, usage, cost_usd, generation_stats }) => TaskOutcome {
                task_id: task.id.clone(),
                duration_ms,
                kind: TaskOutcomeKind::Completed { result, usage, cost_usd, generation_stats },
            },
            Err(e) if e.is_abort() || abort.is_aborted() => {
                TaskOutcome { task_id: task.id.clone(), duration_ms, kind: TaskOutcomeKind::Aborted }
            }
            Err(e) => TaskOutcome { task_id: task.id.clone(), duration_ms, kind: TaskOutcomeKind::Failed { error: e.to_string() } },
        }
    }

    async fn execute_tool_task(
        self: &Arc<Self>,
        execution_id: &str,
        sub_step_id: &str,
        task: &SubTask,
        results: &HashMap<String, Value>,
        abort: &AbortSignal,
        emitter: EventEmitter,
    ) -> DagFlowResult<TaskSuccess> {
        let tool_name = task.tool_or_prompt.name.as_str();
        if !self.tools.contains(tool_name) {
            return Err(DagFlowError::tool(tool_name, "tool not registered"));
        }
        let resolved_params = dependency::resolve(&self.dependency_resolvers, task, results);

        let ctx = ToolContext {
            execution_id: execution_id.to_string(),
            sub_step_id: sub_step_id.to_string(),
            store: Arc::clone(&self.store),
            abort: abort.clone(),
            artifacts_dir: self.artifacts_dir.clone(),
            events: emitter,
        };
        let result = self.tools.execute(tool_name, resolved_params, &ctx).await?;
        Ok(TaskSuccess { result, usage: None, cost_usd: None, generation_stats: None })
    }

    async fn execute_inference_task(
        self: &Arc<Self>,
        task: &SubTask,
        agent_map: &HashMap<String, Agent>,
        results: &HashMap<String, Value>,
        abort: &AbortSignal,
    ) -> DagFlowResult<TaskSuccess> {
        let agent_name = &task.tool_or_prompt.name;
        let agent = agent_map
            .get(agent_name)
            .ok_or_else(|| DagFlowError::configuration(format!("no active agent named '{agent_name}'")))?;
        let provider = self.llm_resolver.resolve(&agent.provider, &agent.model).await?;

        let prompt = build_inference_prompt(task, &task.dependencies, results, &agent.prompt_template);
        let response = provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::system("You are executing one step of a larger plan."), ChatMessage::user(&prompt)],
                temperature: None,
                max_tokens: None,
                seed: None,
                abort: Some(abort.clone()),
            })
            .await
            .map_err(|e| DagFlowError::LlmTransport(e.to_string()))?;

        Ok(TaskSuccess {
            result: Value::String(response.content),
            usage: response.usage,
            cost_usd: response.cost_usd,
            generation_stats: response.generation_stats,
        })
    }

    async fn run_synthesis(
        self: &Arc<Self>,
        execution_id: &str,
        plan: &Plan,
        config: &ExecutionConfig,
        sub_steps_by_task: &HashMap<String, SubStep>,
        results: &HashMap<String, Value>,
    ) -> DagFlowResult<()> {
        self.emit(execution_id, config, EventType::SynthesisStarted, None);
        let started = std::time::Instant::now();

        let combined_results = plan
            .sub_tasks
            .iter()
            .map(|t| {
                let value = results.get(&t.id).cloned().unwrap_or(Value::Null);
                format!("### {}\n{}\n\n{}", t.id, t.description, stringify_result(&value))
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = format!("{}\n\n{}", plan.synthesis_plan, combined_results);
        let response = self
            .default_llm
            .chat(ChatRequest {
                messages: vec![ChatMessage::system("You are a helpful markdown synthesizer."), ChatMessage::user(&user_prompt)],
                temperature: None,
                max_tokens: None,
                seed: None,
                abort: None,
            })
            .await
            .map_err(|e| DagFlowError::LlmTransport(e.to_string()))?;

        let synthesis_text = run_validation_pass(&response.content);

        let synthesis_step = SubStep {
            status: SubStepStatus::Completed,
            started_at: Some(chrono::Utc::now()),
            completed_at: Some(chrono::Utc::now()),
            duration_ms: Some(started.elapsed().as_millis() as i64),
            result: Some(Value::String(synthesis_text.to_string())),
            usage: response.usage.clone(),
            cost_usd: response.cost_usd.clone(),
            generation_stats: response.generation_stats.clone(),
            ..SubStep::synthesis(execution_id, plan.sub_tasks.iter().map(|t| t.id.clone()).collect())
        };
        self.store.insert_sub_steps(vec![synthesis_step.clone()]).await?;
        self.emit(
            execution_id,
            config,
            EventType::SynthesisCompleted,
            Some(json!({"durationMs": synthesis_step.duration_ms})),
        );

        let mut all_steps: Vec<SubStep> = sub_steps_by_task.values().cloned().collect();
        all_steps.push(synthesis_step.clone());
        self.finalize_completion(execution_id, config, &all_steps, synthesis_text).await
    }

    async fn finalize_completion(
        self: &Arc<Self>,
        execution_id: &str,
        config: &ExecutionConfig,
        all_steps: &[SubStep],
        synthesis_text: &str,
    ) -> DagFlowResult<()> {
        let counts = task_counts(all_steps.iter().filter(|s| s.task_id != SYNTHESIS_TASK_ID));
        let status = dagflow_kernel::model::derive_execution_status(counts);

        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(execution_id))?;
        execution.status = status;
        execution.completed_tasks = counts.completed;
        execution.failed_tasks = counts.failed;
        execution.waiting_tasks = counts.waiting;
        execution.completed_at = Some(chrono::Utc::now());
        execution.final_result = Some(Value::String(synthesis_text.to_string()));
        execution.synthesis_result = Some(Value::String(synthesis_text.to_string()));
        execution.total_usage = aggregate_usage(all_steps.iter().map(|s| s.usage.as_ref()));
        execution.total_cost_usd = aggregate_cost(all_steps.iter().map(|s| s.cost_usd.as_deref())).map(|d| d.to_string());
        execution.updated_at = chrono::Utc::now();
        self.store.update_execution(execution).await?;

        self.emit(
            execution_id,
            config,
            EventType::Completed,
            Some(json!({"status": status, "completedTasks": counts.completed, "failedTasks": counts.failed})),
        );
        Ok(())
    }

    async fn suspend(
        self: &Arc<Self>,
        execution_id: &str,
        config: &ExecutionConfig,
        reason: &str,
        sub_steps_by_task: Option<&HashMap<String, SubStep>>,
    ) -> DagFlowResult<()> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(execution_id))?;
        execution.status = ExecutionStatus::Suspended;
        execution.suspended_reason = Some(reason.to_string());
        execution.suspended_at = Some(chrono::Utc::now());
        if let Some(steps) = sub_steps_by_task {
            let counts = task_counts(steps.values().filter(|s| s.task_id != SYNTHESIS_TASK_ID));
            execution.completed_tasks = counts.completed;
            execution.failed_tasks = counts.failed;
            execution.waiting_tasks = counts.waiting;
        }
        execution.updated_at = chrono::Utc::now();
        self.store.update_execution(execution).await?;
        self.emit(execution_id, config, EventType::Suspended, Some(json!({"error": {"message": reason}})));
        Ok(())
    }

    /// §4.2 `handleStopDuringExecution` / §9 resolved open question: emits a
    /// `Suspended{code:"stopped"}` terminal event so every subscriber observes
    /// a close, while the persisted execution status lands on `pending` (not
    /// a dedicated "stopped" status) so `resume` can reanimate it later.
    async fn handle_stop_during_execution(
        self: &Arc<Self>,
        execution_id: &str,
        config: &ExecutionConfig,
        sub_steps_by_task: &mut HashMap<String, SubStep>,
    ) -> DagFlowResult<()> {
        for step in sub_steps_by_task.values_mut() {
            if step.status == SubStepStatus::Running {
                step.status = SubStepStatus::Pending;
                step.started_at = None;
                step.updated_at = chrono::Utc::now();
                self.store.update_sub_step(step.clone()).await?;
            }
        }

        let counts = task_counts(sub_steps_by_task.values().filter(|s| s.task_id != SYNTHESIS_TASK_ID));
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(execution_id))?;
        execution.status = ExecutionStatus::Pending;
        execution.completed_tasks = counts.completed;
        execution.failed_tasks = counts.failed;
        execution.waiting_tasks = counts.waiting;
        execution.updated_at = chrono::Utc::now();
        self.store.update_execution(execution).await?;
        self.store.mark_stop_handled_for_execution(execution_id).await?;

        self.emit(
            execution_id,
            config,
            EventType::Suspended,
            Some(json!({"error": {"message": "stopped by request", "code": "stopped"}})),
        );
        Ok(())
    }

    async fn mark_running(&self, execution_id: &str) -> DagFlowResult<()> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DagFlowError::not_found(execution_id))?;
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(chrono::Utc::now());
        execution.updated_at = chrono::Utc::now();
        self.store.update_execution(execution).await
    }

    async fn prefetch_agents(&self, plan: &Plan) -> DagFlowResult<Arc<HashMap<String, Agent>>> {
        let mut names: HashSet<String> = HashSet::new();
        for task in &plan.sub_tasks {
            if is_inference(task) {
                names.insert(task.tool_or_prompt.name.clone());
            }
        }
        let mut map = HashMap::new();
        for name in names {
            if let Some(agent) = self.store.get_active_agent(&name).await? {
                map.insert(name, agent);
            }
        }
        Ok(Arc::new(map))
    }

    async fn load_sub_steps_by_task(&self, execution_id: &str) -> DagFlowResult<HashMap<String, SubStep>> {
        let steps = self.store.get_sub_steps(execution_id).await?;
        Ok(steps.into_iter().filter(|s| s.task_id != SYNTHESIS_TASK_ID).map(|s| (s.task_id.clone(), s)).collect())
    }

    fn emit(&self, execution_id: &str, config: &ExecutionConfig, event_type: EventType, data: Option<Value>) {
        if config.skip_events {
            return;
        }
        let mut event = ExecutionEvent::new(event_type, execution_id, now_millis());
        if let Some(data) = data {
            event = event.with_data(data);
        }
        self.bus.publish(event);
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct TaskSuccess {
    result: Value,
    usage: Option<Usage>,
    cost_usd: Option<String>,
    generation_stats: Option<Value>,
}

enum TaskOutcomeKind {
    Completed { result: Value, usage: Option<Usage>, cost_usd: Option<String>, generation_stats: Option<Value> },
    Failed { error: String },
    Aborted,
}

struct TaskOutcome {
    task_id: String,
    duration_ms: i64,
    kind: TaskOutcomeKind,
}

fn is_inference(task: &SubTask) -> bool {
    task.action_type == ActionType::Inference || task.tool_or_prompt.name == "inference"
}

fn task_ready(task: &SubTask, executed: &HashSet<String>) -> bool {
    task.is_root() || task.dependencies.iter().all(|d| d == NO_DEPENDENCIES || executed.contains(d))
}

fn task_counts<'a>(steps: impl Iterator<Item = &'a SubStep>) -> TaskCounts {
    let mut counts = TaskCounts::default();
    for step in steps {
        counts.total += 1;
        match step.status {
            SubStepStatus::Completed => counts.completed += 1,
            SubStepStatus::Failed => counts.failed += 1,
            SubStepStatus::Running => counts.running += 1,
            SubStepStatus::Waiting => counts.waiting += 1,
            SubStepStatus::Pending => counts.pending += 1,
            SubStepStatus::Deleted => {}
        }
    }
    counts
}

fn build_inference_prompt(task: &SubTask, dependencies: &[String], results: &HashMap<String, Value>, agent_prompt_template: &str) -> String {
    let mut snippets = String::new();
    for dep in dependencies {
        if dep == NO_DEPENDENCIES {
            continue;
        }
        if let Some(value) = results.get(dep) {
            let mut snippet = stringify_result(value);
            if snippet.chars().count() > INFERENCE_DEPENDENCY_SNIPPET_CAP {
                snippet = snippet.chars().take(INFERENCE_DEPENDENCY_SNIPPET_CAP).collect::<String>() + "...";
            }
            snippets.push_str(&format!("\n--- Result of Task {dep} ---\n{snippet}\n"));
        }
    }
    format!(
        "You are one step in a larger plan.\n\nTask: {}\n\nRelevant prior results:{}\n\n{}",
        task.description, snippets, agent_prompt_template
    )
}

fn stringify_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map.get("content").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Reserved pass-through hook for future post-synthesis validation (§4.2).
fn run_validation_pass(synthesis_text: &str) -> &str {
    synthesis_text
}

fn substitute_runtime_tokens(plan: &mut Value) {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    walk_replace_tokens(plan, &today);
}

fn walk_replace_tokens(value: &mut Value, today: &str) {
    match value {
        Value::String(s) => {
            if s.contains("{{currentDate}}") || s.contains("{{Today}}") {
                *s = s.replace("{{currentDate}}", today).replace("{{Today}}", today);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_replace_tokens(item, today);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                walk_replace_tokens(v, today);
            }
        }
        _ => {}
    }
}

fn plan_schema() -> Value {
    json!({
        "type": "object",
        "required": ["intent", "validation", "sub_tasks"],
        "properties": {
            "intent": {"type": "object", "required": ["primary"]},
            "validation": {"type": "object", "required": ["coverage"]},
            "sub_tasks": {"type": "array"}
        }
    })
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
            tool_or_prompt: dagflow_kernel::model::ToolOrPrompt { name: "shell".into(), params: None },
            expected_output: "o".into(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn task_ready_respects_root_sentinel_and_satisfied_deps() {
        let root = task("001", &["none"]);
        let child = task("002", &["001"]);
        let executed = HashSet::new();
        assert!(task_ready(&root, &executed));
        assert!(!task_ready(&child, &executed));

        let mut executed_with_root = HashSet::new();
        executed_with_root.insert("001".to_string());
        assert!(task_ready(&child, &executed_with_root));
    }

    #[test]
    fn task_counts_matches_truth_table_inputs() {
        let steps = vec![
            SubStep { status: SubStepStatus::Completed, ..SubStep::from_sub_task("exec_1", &task("001", &["none"])) },
            SubStep { status: SubStepStatus::Failed, ..SubStep::from_sub_task("exec_1", &task("002", &["001"])) },
        ];
        let counts = task_counts(steps.iter());
        assert_eq!(counts.total, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn runtime_tokens_are_substituted_recursively() {
        let mut value = json!({"sub_tasks": [{"description": "Report for {{currentDate}}"}]});
        substitute_runtime_tokens(&mut value);
        let description = value["sub_tasks"][0]["description"].as_str().unwrap();
        assert!(!description.contains("{{currentDate}}"));
    }
}
