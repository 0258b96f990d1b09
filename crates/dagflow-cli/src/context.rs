//! Shared context wiring the store, event bus, tool registry, executor,
//! planner, and stop coordinator used by every CLI command.

use crate::config::CliConfig;
use crate::error::CliError;
use crate::llm::EnvLlmResolver;
use crate::store::SqliteStore;
use dagflow_foundation::Planner;
use dagflow_kernel::{EventBus, StopCoordinator, Store, ToolRegistry};
use dagflow_runtime::{register_builtin_tools, Executor, LlmResolver};
use std::sync::Arc;

pub struct CliContext {
    pub config: CliConfig,
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
    pub executor: Arc<Executor>,
    pub planner: Arc<Planner>,
    pub stop: Arc<StopCoordinator>,
}

impl CliContext {
    pub async fn new(config: CliConfig) -> Result<Self, CliError> {
        std::fs::create_dir_all(&config.artifacts_dir)?;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.database_url).await?);
        let bus = Arc::new(EventBus::new());
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry);
        let tools = Arc::new(registry);

        let llm_resolver: Arc<dyn LlmResolver> = Arc::new(EnvLlmResolver::new());
        let default_llm =
            llm_resolver.resolve(&config.default_provider, &config.default_model).await?;

        let executor = Executor::new(
            store.clone(),
            bus.clone(),
            tools.clone(),
            llm_resolver,
            default_llm.clone(),
            config.artifacts_dir.clone(),
        );
        let planner = Arc::new(Planner::new(store.clone(), default_llm, tools.clone()));
        let stop = Arc::new(StopCoordinator::new(store.clone()));

        Ok(Self { config, store, bus, tools, executor, planner, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> CliConfig {
        CliConfig {
            database_url: "sqlite::memory:".to_string(),
            artifacts_dir: dir.join("artifacts"),
            default_provider: "openai".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    #[tokio::test]
    async fn builds_a_working_context_against_an_in_memory_db() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CliContext::new(test_config(dir.path())).await.unwrap();
        assert!(ctx.tools.contains("shellExec"));
        assert!(ctx.tools.contains("fetchURLs"));
        assert!(ctx.store.list_dags().await.unwrap().is_empty());
    }
}
