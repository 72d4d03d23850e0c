//! Tool lookup and execution under a per-call deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use quarry_domain::tool::{ToolArgs, ToolResult};
use quarry_domain::{Error, Result};

use crate::cache::InstanceCache;
use crate::Tool;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name → tool mapping shared across investigations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, "tool registered");
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .tools
            .read()
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();
        entries.sort();
        entries
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs tools under a per-call deadline and owns the instance cache
/// expensive collaborators are built through.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    cache: Arc<InstanceCache>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, cache: Arc<InstanceCache>, timeout: Duration) -> Self {
        Self {
            registry,
            cache,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    /// Execute a tool by name.
    ///
    /// Unknown name ⇒ [`Error::UnknownTool`]; deadline breach ⇒
    /// [`Error::Timeout`]; a collaborator error is wrapped into
    /// [`Error::ToolExecution`] carrying the original message.
    pub async fn execute(&self, name: &str, args: &ToolArgs) -> Result<ToolResult> {
        let tool = self.registry.get(name)?;

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.timeout, tool.execute(args)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Err(_) => {
                tracing::warn!(tool = name, elapsed_ms, "tool call timed out");
                Err(Error::Timeout(format!(
                    "tool '{name}' exceeded {}s deadline",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = name, elapsed_ms, error = %e, "tool call failed");
                match e {
                    Error::UnknownTool(_) | Error::Timeout(_) => Err(e),
                    other => Err(Error::ToolExecution {
                        tool: name.to_string(),
                        message: other.to_string(),
                    }),
                }
            }
            Ok(Ok(result)) => {
                tracing::debug!(tool = name, elapsed_ms, keys = result.len(), "tool call ok");
                Ok(result)
            }
        }
    }
}
