//! The `Store` trait: the five-table persistence contract (§4.5) that backs
//! the planner, executor, and stop coordinator. `dagflow-cli` provides the
//! sqlx/SQLite implementation; an in-memory implementation lives here for
//! unit tests across the workspace.

use crate::error::DagFlowResult;
use crate::model::{Agent, Dag, DagExecution, StopRequest, SubStep};
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    // -- Agents --------------------------------------------------------
    async fn get_active_agent(&self, name: &str) -> DagFlowResult<Option<Agent>>;
    async fn upsert_agent(&self, agent: Agent) -> DagFlowResult<()>;
    async fn set_active(&self, name: &str, version: i64) -> DagFlowResult<()>;
    async fn list_agents(&self) -> DagFlowResult<Vec<Agent>>;
    async fn delete_agent(&self, id: &str) -> DagFlowResult<bool>;

    // -- DAGs ------------------------------------------------------------
    async fn insert_dag(&self, dag: Dag) -> DagFlowResult<()>;
    async fn get_dag(&self, id: &str) -> DagFlowResult<Option<Dag>>;
    async fn update_dag(&self, dag: Dag) -> DagFlowResult<()>;
    /// Blocked (returns `Err`) if any `DagExecution` still references `id`
    /// (§3 lifecycle: explicit referential check, not cascade).
    async fn delete_dag(&self, id: &str) -> DagFlowResult<()>;
    async fn list_dags(&self) -> DagFlowResult<Vec<Dag>>;
    async fn list_scheduled_dags(&self) -> DagFlowResult<Vec<Dag>>;

    // -- Executions --------------------------------------------------------
    async fn insert_execution(&self, execution: DagExecution) -> DagFlowResult<()>;
    async fn get_execution(&self, id: &str) -> DagFlowResult<Option<DagExecution>>;
    async fn update_execution(&self, execution: DagExecution) -> DagFlowResult<()>;
    async fn list_executions(&self, dag_id: Option<&str>) -> DagFlowResult<Vec<DagExecution>>;
    /// Cascades to the execution's sub-steps (§3 lifecycle).
    async fn delete_execution(&self, id: &str) -> DagFlowResult<()>;

    // -- SubSteps --------------------------------------------------------
    async fn insert_sub_steps(&self, steps: Vec<SubStep>) -> DagFlowResult<()>;
    async fn get_sub_steps(&self, execution_id: &str) -> DagFlowResult<Vec<SubStep>>;
    async fn update_sub_step(&self, step: SubStep) -> DagFlowResult<()>;
    /// Batched write for wave-boundary updates (§4.2 `batchDbUpdates`).
    async fn update_sub_steps(&self, steps: Vec<SubStep>) -> DagFlowResult<()> {
        for step in steps {
            self.update_sub_step(step).await?;
        }
        Ok(())
    }

    // -- StopRequests ------------------------------------------------------
    async fn request_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<StopRequest>;
    async fn request_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<StopRequest>;
    async fn has_active_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<bool>;
    async fn has_active_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<bool>;
    async fn mark_stop_handled_for_dag(&self, dag_id: &str) -> DagFlowResult<()>;
    async fn mark_stop_handled_for_execution(&self, execution_id: &str) -> DagFlowResult<()>;
}

/// In-memory `Store` used by the test suites of every crate in the workspace,
/// and by the CLI's `--in-memory` escape hatch for quick experimentation.
pub mod memory {
    use super::*;
    use crate::error::DagFlowError;
    use crate::model::{new_stop_request_id, StopRequestStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tables {
        agents: HashMap<String, Agent>,
        dags: HashMap<String, Dag>,
        executions: HashMap<String, DagExecution>,
        sub_steps: HashMap<String, Vec<SubStep>>,
        stop_requests: Vec<StopRequest>,
    }

    #[derive(Default)]
    pub struct InMemoryStore {
        inner: Mutex<Tables>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Store for InMemoryStore {
        async fn get_active_agent(&self, name: &str) -> DagFlowResult<Option<Agent>> {
            let t = self.inner.lock().unwrap();
            Ok(t.agents.values().find(|a| a.name == name && a.active).cloned())
        }

        async fn upsert_agent(&self, agent: Agent) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            if agent.active {
                for a in t.agents.values_mut() {
                    if a.name == agent.name {
                        a.active = false;
                    }
                }
            }
            t.agents.insert(agent.id.clone(), agent);
            Ok(())
        }

        async fn set_active(&self, name: &str, version: i64) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            let mut found = false;
            for a in t.agents.values_mut() {
                if a.name == name {
                    a.active = a.version == version;
                    found |= a.active;
                }
            }
            if !found {
                return Err(DagFlowError::not_found(format!("agent {name} v{version}")));
            }
            Ok(())
        }

        async fn list_agents(&self) -> DagFlowResult<Vec<Agent>> {
            Ok(self.inner.lock().unwrap().agents.values().cloned().collect())
        }

        async fn delete_agent(&self, id: &str) -> DagFlowResult<bool> {
            Ok(self.inner.lock().unwrap().agents.remove(id).is_some())
        }

        async fn insert_dag(&self, dag: Dag) -> DagFlowResult<()> {
            self.inner.lock().unwrap().dags.insert(dag.id.clone(), dag);
            Ok(())
        }

        async fn get_dag(&self, id: &str) -> DagFlowResult<Option<Dag>> {
            Ok(self.inner.lock().unwrap().dags.get(id).cloned())
        }

        async fn update_dag(&self, dag: Dag) -> DagFlowResult<()> {
            self.inner.lock().unwrap().dags.insert(dag.id.clone(), dag);
            Ok(())
        }

        async fn delete_dag(&self, id: &str) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            let referenced = t.executions.values().any(|e| e.dag_id.as_deref() == Some(id));
            if referenced {
                return Err(DagFlowError::validation(format!(
                    "dag '{id}' has executions and cannot be deleted"
                )));
            }
            t.dags.remove(id);
            Ok(())
        }

        async fn list_dags(&self) -> DagFlowResult<Vec<Dag>> {
            Ok(self.inner.lock().unwrap().dags.values().cloned().collect())
        }

        async fn list_scheduled_dags(&self) -> DagFlowResult<Vec<Dag>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .dags
                .values()
                .filter(|d| d.cron_schedule.is_some())
                .cloned()
                .collect())
        }

        async fn insert_execution(&self, execution: DagExecution) -> DagFlowResult<()> {
            self.inner.lock().unwrap().executions.insert(execution.id.clone(), execution);
            Ok(())
        }

        async fn get_execution(&self, id: &str) -> DagFlowResult<Option<DagExecution>> {
            Ok(self.inner.lock().unwrap().executions.get(id).cloned())
        }

        async fn update_execution(&self, execution: DagExecution) -> DagFlowResult<()> {
            self.inner.lock().unwrap().executions.insert(execution.id.clone(), execution);
            Ok(())
        }

        async fn list_executions(&self, dag_id: Option<&str>) -> DagFlowResult<Vec<DagExecution>> {
            let t = self.inner.lock().unwrap();
            Ok(t.executions
                .values()
                .filter(|e| dag_id.is_none_or(|d| e.dag_id.as_deref() == Some(d)))
                .cloned()
                .collect())
        }

        async fn delete_execution(&self, id: &str) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            t.executions.remove(id);
            t.sub_steps.remove(id);
            Ok(())
        }

        async fn insert_sub_steps(&self, steps: Vec<SubStep>) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            for step in steps {
                t.sub_steps.entry(step.execution_id.clone()).or_default().push(step);
            }
            Ok(())
        }

        async fn get_sub_steps(&self, execution_id: &str) -> DagFlowResult<Vec<SubStep>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .sub_steps
                .get(execution_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn update_sub_step(&self, step: SubStep) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            let rows = t.sub_steps.entry(step.execution_id.clone()).or_default();
            if let Some(existing) = rows.iter_mut().find(|s| s.id == step.id) {
                *existing = step;
            } else {
                rows.push(step);
            }
            Ok(())
        }

        async fn request_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<StopRequest> {
            let mut t = self.inner.lock().unwrap();
            if let Some(existing) = t.stop_requests.iter().find(|r| {
                r.dag_id.as_deref() == Some(dag_id) && r.status == StopRequestStatus::Requested
            }) {
                return Ok(existing.clone());
            }
            let req = StopRequest {
                id: new_stop_request_id(),
                dag_id: Some(dag_id.to_string()),
                execution_id: None,
                status: StopRequestStatus::Requested,
                requested_at: chrono::Utc::now(),
                handled_at: None,
            };
            t.stop_requests.push(req.clone());
            Ok(req)
        }

        async fn request_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<StopRequest> {
            let mut t = self.inner.lock().unwrap();
            if let Some(existing) = t.stop_requests.iter().find(|r| {
                r.execution_id.as_deref() == Some(execution_id) && r.status == StopRequestStatus::Requested
            }) {
                return Ok(existing.clone());
            }
            let req = StopRequest {
                id: new_stop_request_id(),
                dag_id: None,
                execution_id: Some(execution_id.to_string()),
                status: StopRequestStatus::Requested,
                requested_at: chrono::Utc::now(),
                handled_at: None,
            };
            t.stop_requests.push(req.clone());
            Ok(req)
        }

        async fn has_active_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<bool> {
            let t = self.inner.lock().unwrap();
            Ok(t.stop_requests
                .iter()
                .any(|r| r.dag_id.as_deref() == Some(dag_id) && r.status == StopRequestStatus::Requested))
        }

        async fn has_active_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<bool> {
            let t = self.inner.lock().unwrap();
            Ok(t.stop_requests.iter().any(|r| {
                r.execution_id.as_deref() == Some(execution_id) && r.status == StopRequestStatus::Requested
            }))
        }

        async fn mark_stop_handled_for_dag(&self, dag_id: &str) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            for r in t.stop_requests.iter_mut() {
                if r.dag_id.as_deref() == Some(dag_id) && r.status == StopRequestStatus::Requested {
                    r.status = StopRequestStatus::Handled;
                    r.handled_at = Some(chrono::Utc::now());
                }
            }
            Ok(())
        }

        async fn mark_stop_handled_for_execution(&self, execution_id: &str) -> DagFlowResult<()> {
            let mut t = self.inner.lock().unwrap();
            for r in t.stop_requests.iter_mut() {
                if r.execution_id.as_deref() == Some(execution_id) && r.status == StopRequestStatus::Requested {
                    r.status = StopRequestStatus::Handled;
                    r.handled_at = Some(chrono::Utc::now());
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryStore;
    use super::*;

    #[tokio::test]
    async fn dag_delete_blocked_by_referencing_execution() {
        let store = InMemoryStore::new();
        let dag = crate::model::Dag {
            id: "dag_1".into(),
            status: crate::model::DagStatus::Success,
            result: serde_json::json!({}),
            params: serde_json::json!({}),
            agent_name: "decomposer".into(),
            dag_title: None,
            cron_schedule: None,
            schedule_active: None,
            timezone: None,
            planning_total_usage: Default::default(),
            planning_total_cost_usd: None,
            planning_attempts: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store.insert_dag(dag).await.unwrap();
        let exec = DagExecution::new("exec_1".into(), Some("dag_1".into()), "goal".into(), "intent".into(), 0);
        store.insert_execution(exec).await.unwrap();

        assert!(store.delete_dag("dag_1").await.is_err());
        store.delete_execution("exec_1").await.unwrap();
        assert!(store.delete_dag("dag_1").await.is_ok());
    }

    #[tokio::test]
    async fn repeated_stop_request_is_idempotent() {
        let store = InMemoryStore::new();
        let r1 = store.request_stop_for_execution("exec_1").await.unwrap();
        let r2 = store.request_stop_for_execution("exec_1").await.unwrap();
        assert_eq!(r1.id, r2.id);
        assert!(store.has_active_stop_for_execution("exec_1").await.unwrap());
    }
}
