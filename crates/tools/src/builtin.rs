//! Built-in investigative tools over the demo dataset.
//!
//! These back the stub/demo pipeline: entity search, watchlist
//! screening, news lookup, ownership tracing, and the graph
//! post-processor. Each is a collaborator behind the [`Tool`] trait; the
//! expensive pieces (dataset, graph engine) are built through the
//! executor's instance cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use quarry_domain::entity::Entity;
use quarry_domain::tool::{ToolArgs, ToolResult};
use quarry_domain::{Error, Result};

use crate::cache::InstanceCache;
use crate::demo::DemoData;
use crate::registry::ToolRegistry;
use crate::Tool;

/// Register the full built-in tool set.
pub fn register_builtin_tools(registry: &ToolRegistry, cache: &InstanceCache) {
    let data = cache.get_or_create("demo_data", DemoData::new);
    registry.register(Arc::new(EntitySearchTool { data: data.clone() }));
    registry.register(Arc::new(SanctionsScreenTool { data: data.clone() }));
    registry.register(Arc::new(NewsCheckTool { data: data.clone() }));
    registry.register(Arc::new(TraceOwnershipTool { data }));
    let engine = cache.get_or_create("graph_engine", GraphEngine::new);
    registry.register(Arc::new(GraphBuildTool { engine }));
}

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn require_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    str_arg(args, key).ok_or_else(|| Error::Other(format!("missing '{key}' argument")))
}

fn entities_to_value(entities: &[Entity]) -> Value {
    serde_json::to_value(entities).unwrap_or_else(|_| json!([]))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search_entities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EntitySearchTool {
    data: Arc<DemoData>,
}

#[async_trait]
impl Tool for EntitySearchTool {
    fn name(&self) -> &str {
        "search_entities"
    }

    fn description(&self) -> &str {
        "Search registries for persons, companies, and their relationships"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let query = require_str(args, "query")?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(20) as usize;

        let entities = self.data.search(query, limit);
        let mut result = ToolResult::new();
        result.insert("result_count".into(), json!(entities.len()));
        result.insert("entities".into(), entities_to_value(&entities));
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// screen_sanctions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SanctionsScreenTool {
    data: Arc<DemoData>,
}

#[async_trait]
impl Tool for SanctionsScreenTool {
    fn name(&self) -> &str {
        "screen_sanctions"
    }

    fn description(&self) -> &str {
        "Screen a target against watchlists and sanctions data"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        // Accept either an entity id or a free-text target.
        let target = match str_arg(args, "entity_id") {
            Some(id) => self
                .data
                .entity(id)
                .map(|e| e.name().to_string())
                .unwrap_or_else(|| id.to_string()),
            None => str_arg(args, "query").unwrap_or_default().to_string(),
        };

        let matches = self.data.sanctions_matches(&target);
        let mut result = ToolResult::new();
        result.insert("result_count".into(), json!(matches.len()));
        result.insert("matches".into(), Value::Array(matches));
        result.insert("target".into(), json!(target));
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// check_news
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct NewsCheckTool {
    data: Arc<DemoData>,
}

#[async_trait]
impl Tool for NewsCheckTool {
    fn name(&self) -> &str {
        "check_news"
    }

    fn description(&self) -> &str {
        "Search press coverage and OSINT sources for the target"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let query = require_str(args, "query")?;
        let articles = self.data.articles(query);
        let mut result = ToolResult::new();
        result.insert("result_count".into(), json!(articles.len()));
        result.insert("articles".into(), Value::Array(articles));
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// trace_ownership
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TraceOwnershipTool {
    data: Arc<DemoData>,
}

#[async_trait]
impl Tool for TraceOwnershipTool {
    fn name(&self) -> &str {
        "trace_ownership"
    }

    fn description(&self) -> &str {
        "Trace beneficial ownership chains from an entity"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let entity_id = match str_arg(args, "entity_id") {
            Some(id) => id.to_string(),
            // The query may already be an entity id (leads suggest ids);
            // otherwise resolve it against entity names.
            None => {
                let query = require_str(args, "query")?;
                if self.data.entity(query).is_some() {
                    query.to_string()
                } else {
                    self.data
                        .search(query, 1)
                        .first()
                        .map(|e| e.id.clone())
                        .unwrap_or_default()
                }
            }
        };

        let (chain, circular) = self.data.ownership_chain(&entity_id);
        let mut result = ToolResult::new();
        result.insert("result_count".into(), json!(chain.len()));
        result.insert("entities".into(), entities_to_value(&chain));
        result.insert("circular".into(), json!(circular));
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// build_graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Minimal graph engine over entity arenas: counts nodes/edges and finds
/// circular ownership by walking owner → asset edges.
pub struct GraphEngine;

impl GraphEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, entities: &[Entity]) -> Value {
        let nodes: Vec<&Entity> = entities.iter().filter(|e| !e.is_relationship()).collect();
        let edges: Vec<&Entity> = entities.iter().filter(|e| e.is_relationship()).collect();

        let mut ownership: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges.iter().filter(|e| e.schema == "Ownership") {
            if let (Some(owner), Some(asset)) = (edge.property("owner"), edge.property("asset")) {
                ownership.entry(owner).or_default().push(asset);
            }
        }

        let cycles = find_cycles(&ownership);

        json!({
            "node_count": nodes.len(),
            "edge_count": edges.len(),
            "circular_ownership": cycles,
        })
    }
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// DFS cycle search over the ownership adjacency; each cycle is reported
/// once, rotated to start at its smallest id.
fn find_cycles(adjacency: &HashMap<&str, Vec<&str>>) -> Vec<Vec<String>> {
    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();

    for &start in adjacency.keys() {
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(start, vec![start])];
        while let Some((current, path)) = stack.pop() {
            let Some(next_nodes) = adjacency.get(current) else {
                continue;
            };
            for &next in next_nodes {
                if next == start {
                    let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
                    // Canonical rotation so each cycle is reported once.
                    if let Some(min_pos) = cycle
                        .iter()
                        .enumerate()
                        .min_by(|a, b| a.1.cmp(b.1))
                        .map(|(i, _)| i)
                    {
                        cycle.rotate_left(min_pos);
                    }
                    if seen.insert(cycle.clone()) {
                        cycles.push(cycle);
                    }
                } else if !path.contains(&next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    stack.push((next, extended));
                }
            }
        }
    }

    cycles.sort();
    cycles
}

pub struct GraphBuildTool {
    engine: Arc<GraphEngine>,
}

#[async_trait]
impl Tool for GraphBuildTool {
    fn name(&self) -> &str {
        "build_graph"
    }

    fn description(&self) -> &str {
        "Build an investigation graph over the accumulated entities"
    }

    async fn execute(&self, args: &ToolArgs) -> Result<ToolResult> {
        let entities: Vec<Entity> = match args.get("entities") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Other(format!("invalid 'entities' argument: {e}")))?,
            None => Vec::new(),
        };

        let graph = self.engine.build(&entities);
        let mut result = ToolResult::new();
        result.insert("result_count".into(), graph["node_count"].clone());
        result.insert("graph".into(), graph);
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
