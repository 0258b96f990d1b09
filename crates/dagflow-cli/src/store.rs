//! sqlx/SQLite implementation of `dagflow_kernel::storage::Store` across the
//! five tables (§4.5): `agents`, `dags`, `dag_executions`, `sub_steps`,
//! `stop_requests`. Each row keeps a handful of indexed scalar columns for
//! the lookups the trait needs (status, dag_id, active) plus a `data` JSON
//! column holding the full serialized struct — the nested `Usage`/`Plan`/
//! `PlanningAttempt` shapes don't map cleanly onto individual columns, so
//! this follows the same `row.get` + reconstruct idiom as the teacher's
//! `SqliteAgentStateStore` one level up, with JSON absorbing the rest.

use async_trait::async_trait;
use dagflow_kernel::model::{new_stop_request_id, Agent, Dag, DagExecution, StopRequest, StopRequestStatus, SubStep};
use dagflow_kernel::{DagFlowError, DagFlowResult, Store};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    fn to_sqlx<E: std::error::Error>(e: E) -> DagFlowError {
        DagFlowError::Internal(e.to_string())
    }
}

/// Table definitions, also exported via `db schema`/`db init`.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    version INTEGER NOT NULL,
    active INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_name_active ON agents(name, active);

CREATE TABLE IF NOT EXISTS dags (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    cron_schedule TEXT,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dag_executions (
    id TEXT PRIMARY KEY,
    dag_id TEXT,
    status TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_executions_dag_id ON dag_executions(dag_id);

CREATE TABLE IF NOT EXISTS sub_steps (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sub_steps_execution_id ON sub_steps(execution_id);

CREATE TABLE IF NOT EXISTS stop_requests (
    id TEXT PRIMARY KEY,
    dag_id TEXT,
    execution_id TEXT,
    status TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stop_requests_dag_id ON stop_requests(dag_id, status);
CREATE INDEX IF NOT EXISTS idx_stop_requests_execution_id ON stop_requests(execution_id, status);
"#;

#[async_trait]
impl Store for SqliteStore {
    async fn get_active_agent(&self, name: &str) -> DagFlowResult<Option<Agent>> {
        let row = sqlx::query("SELECT data FROM agents WHERE name = ? AND active = 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        row.map(|r| decode::<Agent>(r.get::<String, _>("data"))).transpose()
    }

    async fn upsert_agent(&self, agent: Agent) -> DagFlowResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        if agent.active {
            sqlx::query(
                "UPDATE agents SET active = 0, data = json_set(data, '$.active', json('false')) WHERE name = ?",
            )
            .bind(&agent.name)
            .execute(&mut *tx)
            .await
            .map_err(Self::to_sqlx)?;
        }
        let data = encode(&agent)?;
        sqlx::query(
            "INSERT INTO agents (id, name, version, active, data) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, version = excluded.version, active = excluded.active, data = excluded.data",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(agent.version)
        .bind(agent.active as i64)
        .bind(data)
        .execute(&mut *tx)
        .await
        .map_err(Self::to_sqlx)?;
        tx.commit().await.map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn set_active(&self, name: &str, version: i64) -> DagFlowResult<()> {
        let rows = sqlx::query("SELECT id, data FROM agents WHERE name = ?")
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        if rows.is_empty() {
            return Err(DagFlowError::not_found(format!("agent {name} v{version}")));
        }
        let mut found = false;
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        for row in rows {
            let id: String = row.get("id");
            let mut agent: Agent = decode(row.get::<String, _>("data"))?;
            agent.active = agent.version == version;
            found |= agent.active;
            let data = encode(&agent)?;
            sqlx::query("UPDATE agents SET active = ?, data = ? WHERE id = ?")
                .bind(agent.active as i64)
                .bind(data)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Self::to_sqlx)?;
        }
        tx.commit().await.map_err(Self::to_sqlx)?;
        if !found {
            return Err(DagFlowError::not_found(format!("agent {name} v{version}")));
        }
        Ok(())
    }

    async fn list_agents(&self) -> DagFlowResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT data FROM agents").fetch_all(&self.pool).await.map_err(Self::to_sqlx)?;
        rows.into_iter().map(|r| decode(r.get::<String, _>("data"))).collect()
    }

    async fn delete_agent(&self, id: &str) -> DagFlowResult<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_dag(&self, dag: Dag) -> DagFlowResult<()> {
        let data = encode(&dag)?;
        sqlx::query("INSERT INTO dags (id, status, cron_schedule, data) VALUES (?, ?, ?, ?)")
            .bind(&dag.id)
            .bind(status_str(&dag.status))
            .bind(&dag.cron_schedule)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn get_dag(&self, id: &str) -> DagFlowResult<Option<Dag>> {
        let row = sqlx::query("SELECT data FROM dags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        row.map(|r| decode::<Dag>(r.get::<String, _>("data"))).transpose()
    }

    async fn update_dag(&self, dag: Dag) -> DagFlowResult<()> {
        let data = encode(&dag)?;
        sqlx::query(
            "INSERT INTO dags (id, status, cron_schedule, data) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, cron_schedule = excluded.cron_schedule, data = excluded.data",
        )
        .bind(&dag.id)
        .bind(status_str(&dag.status))
        .bind(&dag.cron_schedule)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn delete_dag(&self, id: &str) -> DagFlowResult<()> {
        let referenced: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dag_executions WHERE dag_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        if referenced > 0 {
            return Err(DagFlowError::validation(format!("dag '{id}' has executions and cannot be deleted")));
        }
        sqlx::query("DELETE FROM dags WHERE id = ?").bind(id).execute(&self.pool).await.map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn list_dags(&self) -> DagFlowResult<Vec<Dag>> {
        let rows = sqlx::query("SELECT data FROM dags").fetch_all(&self.pool).await.map_err(Self::to_sqlx)?;
        rows.into_iter().map(|r| decode(r.get::<String, _>("data"))).collect()
    }

    async fn list_scheduled_dags(&self) -> DagFlowResult<Vec<Dag>> {
        let rows = sqlx::query("SELECT data FROM dags WHERE cron_schedule IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        rows.into_iter().map(|r| decode(r.get::<String, _>("data"))).collect()
    }

    async fn insert_execution(&self, execution: DagExecution) -> DagFlowResult<()> {
        let data = encode(&execution)?;
        sqlx::query("INSERT INTO dag_executions (id, dag_id, status, data) VALUES (?, ?, ?, ?)")
            .bind(&execution.id)
            .bind(&execution.dag_id)
            .bind(execution_status_str(&execution))
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> DagFlowResult<Option<DagExecution>> {
        let row = sqlx::query("SELECT data FROM dag_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        row.map(|r| decode::<DagExecution>(r.get::<String, _>("data"))).transpose()
    }

    async fn update_execution(&self, execution: DagExecution) -> DagFlowResult<()> {
        let data = encode(&execution)?;
        sqlx::query(
            "INSERT INTO dag_executions (id, dag_id, status, data) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET dag_id = excluded.dag_id, status = excluded.status, data = excluded.data",
        )
        .bind(&execution.id)
        .bind(&execution.dag_id)
        .bind(execution_status_str(&execution))
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn list_executions(&self, dag_id: Option<&str>) -> DagFlowResult<Vec<DagExecution>> {
        let rows = match dag_id {
            Some(id) => sqlx::query("SELECT data FROM dag_executions WHERE dag_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT data FROM dag_executions").fetch_all(&self.pool).await,
        }
        .map_err(Self::to_sqlx)?;
        rows.into_iter().map(|r| decode(r.get::<String, _>("data"))).collect()
    }

    async fn delete_execution(&self, id: &str) -> DagFlowResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        sqlx::query("DELETE FROM sub_steps WHERE execution_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::to_sqlx)?;
        sqlx::query("DELETE FROM dag_executions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::to_sqlx)?;
        tx.commit().await.map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn insert_sub_steps(&self, steps: Vec<SubStep>) -> DagFlowResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        for step in steps {
            let data = encode(&step)?;
            sqlx::query("INSERT INTO sub_steps (id, execution_id, task_id, data) VALUES (?, ?, ?, ?)")
                .bind(&step.id)
                .bind(&step.execution_id)
                .bind(&step.task_id)
                .bind(data)
                .execute(&mut *tx)
                .await
                .map_err(Self::to_sqlx)?;
        }
        tx.commit().await.map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn get_sub_steps(&self, execution_id: &str) -> DagFlowResult<Vec<SubStep>> {
        let rows = sqlx::query("SELECT data FROM sub_steps WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        rows.into_iter().map(|r| decode(r.get::<String, _>("data"))).collect()
    }

    async fn update_sub_step(&self, step: SubStep) -> DagFlowResult<()> {
        let data = encode(&step)?;
        sqlx::query(
            "INSERT INTO sub_steps (id, execution_id, task_id, data) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET execution_id = excluded.execution_id, task_id = excluded.task_id, data = excluded.data",
        )
        .bind(&step.id)
        .bind(&step.execution_id)
        .bind(&step.task_id)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn update_sub_steps(&self, steps: Vec<SubStep>) -> DagFlowResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        for step in steps {
            let data = encode(&step)?;
            sqlx::query(
                "INSERT INTO sub_steps (id, execution_id, task_id, data) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET execution_id = excluded.execution_id, task_id = excluded.task_id, data = excluded.data",
            )
            .bind(&step.id)
            .bind(&step.execution_id)
            .bind(&step.task_id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(Self::to_sqlx)?;
        }
        tx.commit().await.map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn request_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<StopRequest> {
        if let Some(existing) = self.find_active_stop("dag_id", dag_id).await? {
            return Ok(existing);
        }
        let req = StopRequest {
            id: new_stop_request_id(),
            dag_id: Some(dag_id.to_string()),
            execution_id: None,
            status: StopRequestStatus::Requested,
            requested_at: chrono::Utc::now(),
            handled_at: None,
        };
        self.insert_stop_request(&req).await?;
        Ok(req)
    }

    async fn request_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<StopRequest> {
        if let Some(existing) = self.find_active_stop("execution_id", execution_id).await? {
            return Ok(existing);
        }
        let req = StopRequest {
            id: new_stop_request_id(),
            dag_id: None,
            execution_id: Some(execution_id.to_string()),
            status: StopRequestStatus::Requested,
            requested_at: chrono::Utc::now(),
            handled_at: None,
        };
        self.insert_stop_request(&req).await?;
        Ok(req)
    }

    async fn has_active_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<bool> {
        Ok(self.find_active_stop("dag_id", dag_id).await?.is_some())
    }

    async fn has_active_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<bool> {
        Ok(self.find_active_stop("execution_id", execution_id).await?.is_some())
    }

    async fn mark_stop_handled_for_dag(&self, dag_id: &str) -> DagFlowResult<()> {
        self.mark_stop_handled("dag_id", dag_id).await
    }

    async fn mark_stop_handled_for_execution(&self, execution_id: &str) -> DagFlowResult<()> {
        self.mark_stop_handled("execution_id", execution_id).await
    }
}

impl SqliteStore {
    async fn find_active_stop(&self, column: &str, value: &str) -> DagFlowResult<Option<StopRequest>> {
        let sql = format!("SELECT data FROM stop_requests WHERE {column} = ? AND status = 'requested'");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await.map_err(Self::to_sqlx)?;
        row.map(|r| decode::<StopRequest>(r.get::<String, _>("data"))).transpose()
    }

    async fn insert_stop_request(&self, req: &StopRequest) -> DagFlowResult<()> {
        let data = encode(req)?;
        sqlx::query("INSERT INTO stop_requests (id, dag_id, execution_id, status, data) VALUES (?, ?, ?, ?, ?)")
            .bind(&req.id)
            .bind(&req.dag_id)
            .bind(&req.execution_id)
            .bind("requested")
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(Self::to_sqlx)?;
        Ok(())
    }

    async fn mark_stop_handled(&self, column: &str, value: &str) -> DagFlowResult<()> {
        let sql = format!("SELECT id, data FROM stop_requests WHERE {column} = ? AND status = 'requested'");
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await.map_err(Self::to_sqlx)?;
        let mut tx = self.pool.begin().await.map_err(Self::to_sqlx)?;
        for row in rows {
            let id: String = row.get("id");
            let mut req: StopRequest = decode(row.get::<String, _>("data"))?;
            req.status = StopRequestStatus::Handled;
            req.handled_at = Some(chrono::Utc::now());
            let data = encode(&req)?;
            sqlx::query("UPDATE stop_requests SET status = 'handled', data = ? WHERE id = ?")
                .bind(data)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Self::to_sqlx)?;
        }
        tx.commit().await.map_err(Self::to_sqlx)?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DagFlowResult<String> {
    serde_json::to_string(value).map_err(DagFlowError::from)
}

fn decode<T: serde::de::DeserializeOwned>(raw: String) -> DagFlowResult<T> {
    serde_json::from_str(&raw).map_err(DagFlowError::from)
}

fn status_str(status: &dagflow_kernel::model::DagStatus) -> &'static str {
    use dagflow_kernel::model::DagStatus::*;
    match status {
        Success => "success",
        Pending => "pending",
        ValidationError => "validation_error",
    }
}

fn execution_status_str(execution: &DagExecution) -> &'static str {
    use dagflow_kernel::model::ExecutionStatus::*;
    match execution.status {
        Pending => "pending",
        Running => "running",
        Waiting => "waiting",
        Completed => "completed",
        Failed => "failed",
        Partial => "partial",
        Suspended => "suspended",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_kernel::model::{Agent, Dag, DagStatus};

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn dag(id: &str) -> Dag {
        let now = chrono::Utc::now();
        Dag {
            id: id.to_string(),
            status: DagStatus::Success,
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
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn round_trips_a_dag_through_json_column() {
        let store = store().await;
        let mut d = dag("dag_1");
        d.dag_title = Some("weekly report".into());
        d.result = serde_json::json!({
            "originalRequest": "do a thing",
            "intent": {"primary": "thing"},
            "validation": {"coverage": "high"},
        });
        store.insert_dag(d.clone()).await.unwrap();
        let loaded = store.get_dag("dag_1").await.unwrap().unwrap();
        assert_eq!(loaded.dag_title.as_deref(), Some("weekly report"));
        assert_eq!(loaded.agent_name, "decomposer");
    }

    #[tokio::test]
    async fn dag_delete_blocked_by_referencing_execution() {
        let store = store().await;
        store.insert_dag(dag("dag_1")).await.unwrap();
        let exec = DagExecution::new("exec_1".into(), Some("dag_1".into()), "goal".into(), "intent".into(), 0);
        store.insert_execution(exec).await.unwrap();

        assert!(store.delete_dag("dag_1").await.is_err());
        store.delete_execution("exec_1").await.unwrap();
        assert!(store.delete_dag("dag_1").await.is_ok());
    }

    #[tokio::test]
    async fn repeated_stop_request_is_idempotent() {
        let store = store().await;
        let r1 = store.request_stop_for_execution("exec_1").await.unwrap();
        let r2 = store.request_stop_for_execution("exec_1").await.unwrap();
        assert_eq!(r1.id, r2.id);
        assert!(store.has_active_stop_for_execution("exec_1").await.unwrap());
        store.mark_stop_handled_for_execution("exec_1").await.unwrap();
        assert!(!store.has_active_stop_for_execution("exec_1").await.unwrap());
    }

    #[tokio::test]
    async fn only_one_agent_per_name_stays_active() {
        let store = store().await;
        let now = chrono::Utc::now();
        let mut a1 = Agent {
            id: "agent_1".into(),
            name: "decomposer".into(),
            version: 1,
            prompt_template: "v1".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            active: true,
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        store.upsert_agent(a1.clone()).await.unwrap();
        a1.id = "agent_2".into();
        a1.version = 2;
        a1.prompt_template = "v2".into();
        store.upsert_agent(a1).await.unwrap();

        let active = store.get_active_agent("decomposer").await.unwrap().unwrap();
        assert_eq!(active.version, 2);
        let all = store.list_agents().await.unwrap();
        assert_eq!(all.iter().filter(|a| a.active).count(), 1);
    }
}
