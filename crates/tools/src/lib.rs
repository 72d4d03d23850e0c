//! Tool registry and executor.
//!
//! A tool is a named asynchronous operation from a string-keyed argument
//! map to a string-keyed result map. The registry maps names to trait
//! objects; the executor runs a tool under a per-call deadline and owns
//! the instance cache that expensive collaborators are built through.

pub mod builtin;
pub mod cache;
pub mod demo;
pub mod registry;

use async_trait::async_trait;

use quarry_domain::tool::{ToolArgs, ToolResult};
use quarry_domain::Result;

pub use cache::InstanceCache;
pub use registry::{ToolExecutor, ToolRegistry};

/// A named asynchronous investigative operation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult>;
}
