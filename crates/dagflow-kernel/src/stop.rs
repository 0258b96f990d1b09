//! Stop-request coordinator (§4.4): a cooperative cancellation mechanism
//! that can pause a running execution or abort an in-progress plan creation
//! without losing completed work. A thin, idempotent wrapper over the
//! store's `stop_requests` table — it never cascades deletes onto sub-steps.

use crate::error::DagFlowResult;
use crate::model::StopRequest;
use crate::storage::Store;
use std::sync::Arc;

pub struct StopCoordinator {
    store: Arc<dyn Store>,
}

impl StopCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn request_stop_for_dag(&self, dag_id: &str) -> DagFlowResult<StopRequest> {
        self.store.request_stop_for_dag(dag_id).await
    }

    pub async fn request_stop_for_execution(&self, execution_id: &str) -> DagFlowResult<StopRequest> {
        self.store.request_stop_for_execution(execution_id).await
    }

    pub async fn has_active_stop_request_for_dag(&self, dag_id: &str) -> DagFlowResult<bool> {
        self.store.has_active_stop_for_dag(dag_id).await
    }

    pub async fn has_active_stop_request_for_execution(&self, execution_id: &str) -> DagFlowResult<bool> {
        self.store.has_active_stop_for_execution(execution_id).await
    }

    pub async fn mark_stop_request_handled_for_dag(&self, dag_id: &str) -> DagFlowResult<()> {
        self.store.mark_stop_handled_for_dag(dag_id).await
    }

    pub async fn mark_stop_request_handled_for_execution(&self, execution_id: &str) -> DagFlowResult<()> {
        self.store.mark_stop_handled_for_execution(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    #[tokio::test]
    async fn requesting_stop_twice_stays_idempotent() {
        let coordinator = StopCoordinator::new(Arc::new(InMemoryStore::new()));
        let first = coordinator.request_stop_for_execution("exec_1").await.unwrap();
        let second = coordinator.request_stop_for_execution("exec_1").await.unwrap();
        assert_eq!(first.id, second.id);

        assert!(coordinator.has_active_stop_request_for_execution("exec_1").await.unwrap());
        coordinator.mark_stop_request_handled_for_execution("exec_1").await.unwrap();
        assert!(!coordinator.has_active_stop_request_for_execution("exec_1").await.unwrap());
    }
}
