//! Named workflow catalog — predefined tool sequences driven from the
//! CLI.
//!
//! A workflow is a list of steps, each a tool plus a query template
//! where `{target}` is substituted. Built-ins cover the common
//! investigation shapes; YAML files in the configured directory extend
//! the catalog.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use quarry_domain::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub tool: String,
    /// Query template; `{target}` is replaced at run time.
    pub query: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Materialize the steps for a concrete target.
    pub fn resolve(&self, target: &str) -> Vec<WorkflowStep> {
        self.steps
            .iter()
            .map(|step| WorkflowStep {
                tool: step.tool.clone(),
                query: step.query.replace("{target}", target),
                description: step.description.clone(),
            })
            .collect()
    }
}

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.insert(Workflow {
            name: "corporate_ownership".into(),
            description: "Map a company's ownership structure and screen its officers".into(),
            steps: vec![
                WorkflowStep {
                    tool: "search_entities".into(),
                    query: "{target}".into(),
                    description: "Locate the target and adjacent entities".into(),
                },
                WorkflowStep {
                    tool: "trace_ownership".into(),
                    query: "{target}".into(),
                    description: "Walk the beneficial-ownership chain".into(),
                },
                WorkflowStep {
                    tool: "screen_sanctions".into(),
                    query: "{target}".into(),
                    description: "Screen discovered parties against watchlists".into(),
                },
            ],
        });
        registry.insert(Workflow {
            name: "sanctions_exposure".into(),
            description: "Check a target's sanctions exposure and press footprint".into(),
            steps: vec![
                WorkflowStep {
                    tool: "search_entities".into(),
                    query: "{target}".into(),
                    description: "Locate the target".into(),
                },
                WorkflowStep {
                    tool: "screen_sanctions".into(),
                    query: "{target}".into(),
                    description: "Watchlist screen".into(),
                },
                WorkflowStep {
                    tool: "check_news".into(),
                    query: "{target}".into(),
                    description: "Recent coverage".into(),
                },
            ],
        });
        registry
    }

    pub fn insert(&mut self, workflow: Workflow) {
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    pub fn get(&self, name: &str) -> Result<&Workflow> {
        self.workflows
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown workflow '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Load every `*.yaml`/`*.yml` workflow definition in a directory.
    pub fn load_dir(&mut self, directory: &Path) -> Result<()> {
        let read_dir = std::fs::read_dir(directory)
            .map_err(|e| Error::Config(format!("workflows dir {}: {e}", directory.display())))?;
        for entry in read_dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext != "yaml" && ext != "yml" {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            let workflow: Workflow = serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            tracing::debug!(workflow = %workflow.name, path = %path.display(), "workflow loaded");
            self.insert(workflow);
        }
        Ok(())
    }
}
