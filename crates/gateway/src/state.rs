//! Shared application state passed to all API handlers.

use std::sync::Arc;
use std::time::Duration;

use quarry_agent::ProgressBus;
use quarry_domain::config::Config;
use quarry_domain::Result;
use quarry_providers::ProviderRegistry;
use quarry_tools::builtin::register_builtin_tools;
use quarry_tools::{InstanceCache, ToolExecutor, ToolRegistry};

use crate::bridge::InvestigationBridge;
use crate::investigations::{InvestigationStore, MemoryInvestigationStore};
use crate::workflows::WorkflowRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub executor: Arc<ToolExecutor>,
    pub providers: Arc<ProviderRegistry>,
    pub bus: Arc<ProgressBus>,
    pub bridge: Arc<InvestigationBridge>,
    pub investigations: Arc<dyn InvestigationStore>,
    pub workflows: Arc<WorkflowRegistry>,
}

impl AppState {
    /// Wire the full gateway from config: tool registry with built-ins,
    /// providers, progress bus, bridge, and the in-memory investigation
    /// store.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ToolRegistry::new());
        let cache = Arc::new(InstanceCache::new());
        register_builtin_tools(&registry, &cache);
        let executor = Arc::new(ToolExecutor::new(
            registry,
            cache,
            Duration::from_secs(config.agent.tool_timeout_secs),
        ));

        let providers = Arc::new(ProviderRegistry::from_config(&config.llm)?);
        let bus = Arc::new(ProgressBus::new());
        let bridge = Arc::new(InvestigationBridge::new(
            config.agent.clone(),
            config.safety.clone(),
            executor.clone(),
            providers.clone(),
            bus.clone(),
        ));

        let mut workflows = WorkflowRegistry::with_builtins();
        if let Some(path) = &config.workflows.path {
            workflows.load_dir(path)?;
        }

        tracing::info!(
            tools = executor.registry().names().len(),
            providers = providers.ids().len(),
            workflows = workflows.names().len(),
            "gateway state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            executor,
            providers,
            bus,
            bridge,
            investigations: Arc::new(MemoryInvestigationStore::new()),
            workflows: Arc::new(workflows),
        })
    }
}
