//! Investigation session — tracks state across agent turns.
//!
//! A session accumulates entities discovered, leads to follow, tool
//! invocations, and the narrative thread of reasoning. The loop owns the
//! session exclusively while it runs; nothing here needs a lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quarry_domain::entity::Entity;
use quarry_domain::finding::{Finding, Lead, LeadStatus};
use quarry_domain::ids;
use quarry_domain::tool::{summarize_result, ToolArgs, ToolResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool history entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One recorded tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool: String,
    pub args: ToolArgs,
    pub result_summary: String,
    pub timestamp: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable working memory of one investigation.
///
/// Entities live in an insertion-ordered arena with an id → index map, so
/// duplicate ids merge in place, context rendering sees discovery order,
/// and serialization is stable.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub turn_count: u32,
    pub(crate) findings: Vec<Finding>,
    pub(crate) leads: Vec<Lead>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) entity_index: HashMap<String, usize>,
    pub(crate) tool_history: Vec<ToolUse>,
    pub(crate) reasoning_trace: Vec<String>,
    /// Attached by the graph post-processor after the loop.
    pub investigation_graph: Option<Value>,
    /// Attached from the harness audit summary after the loop.
    pub safety_audit: Option<Value>,
}

impl Session {
    pub fn new(goal: impl Into<String>) -> Self {
        Self::with_id(ids::session_id(), goal)
    }

    pub fn with_id(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            started_at: Utc::now(),
            turn_count: 0,
            findings: Vec::new(),
            leads: Vec::new(),
            entities: Vec::new(),
            entity_index: HashMap::new(),
            tool_history: Vec::new(),
            reasoning_trace: Vec::new(),
            investigation_graph: None,
            safety_audit: None,
        }
    }

    // ── Findings & entities ──────────────────────────────────────────

    /// Record a finding and index every entity it references.
    pub fn add_finding(&mut self, finding: Finding) {
        for entity in finding.entities.iter().chain(finding.relationships.iter()) {
            self.upsert_entity(entity);
        }
        tracing::debug!(
            session_id = %self.id,
            source = %finding.source,
            entities = finding.entities.len(),
            "finding added"
        );
        self.findings.push(finding);
    }

    /// Insert an entity, or merge its properties into the existing record
    /// with the same id.
    pub fn upsert_entity(&mut self, entity: &Entity) {
        if entity.id.is_empty() {
            return;
        }
        match self.entity_index.get(&entity.id) {
            Some(&idx) => self.entities[idx].merge_from(entity),
            None => {
                self.entity_index.insert(entity.id.clone(), self.entities.len());
                self.entities.push(entity.clone());
            }
        }
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entity_index.get(id).map(|&idx| &self.entities[idx])
    }

    pub fn has_entity(&self, id: &str) -> bool {
        self.entity_index.contains_key(id)
    }

    /// Entities in discovery order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn finding_count(&self) -> usize {
        self.findings.len()
    }

    // ── Leads ────────────────────────────────────────────────────────

    pub fn add_lead(&mut self, lead: Lead) {
        tracing::info!(
            session_id = %self.id,
            priority = lead.priority,
            description = %lead.description,
            "new lead"
        );
        self.leads.push(lead);
    }

    /// Open leads sorted by priority descending; ties keep insertion
    /// order.
    pub fn get_open_leads(&self) -> Vec<&Lead> {
        let mut open: Vec<&Lead> = self
            .leads
            .iter()
            .filter(|l| l.status == LeadStatus::Open)
            .collect();
        // Stable sort so equal priorities keep insertion order.
        open.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));
        open
    }

    pub fn leads(&self) -> &[Lead] {
        &self.leads
    }

    /// Transition a lead's status. Unknown ids are ignored.
    pub fn resolve_lead(&mut self, lead_id: &str, status: LeadStatus) {
        if let Some(lead) = self.leads.iter_mut().find(|l| l.id == lead_id) {
            lead.status = status;
        }
    }

    // ── History & reasoning ──────────────────────────────────────────

    pub fn record_tool_use(&mut self, tool: &str, args: &ToolArgs, result: &ToolResult) {
        self.tool_history.push(ToolUse {
            tool: tool.to_string(),
            args: args.clone(),
            result_summary: summarize_result(result),
            timestamp: Utc::now(),
        });
    }

    pub fn record_reasoning(&mut self, thought: impl Into<String>) {
        self.reasoning_trace.push(thought.into());
    }

    pub fn tool_history(&self) -> &[ToolUse] {
        &self.tool_history
    }

    pub fn reasoning_trace(&self) -> &[String] {
        &self.reasoning_trace
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Compact textual snapshot for LLM decision-making.
    pub fn context_for_llm(&self, max_chars: usize) -> String {
        let mut parts = vec![
            format!("INVESTIGATION GOAL: {}", self.goal),
            format!("TURN: {}", self.turn_count),
            format!("ENTITIES FOUND: {}", self.entity_count()),
            format!("FINDINGS: {}", self.finding_count()),
        ];

        if !self.findings.is_empty() {
            parts.push("\nRECENT FINDINGS:".to_string());
            for f in self.findings.iter().rev().take(5).rev() {
                parts.push(format!("  - [{}] {}", f.source, f.summary));
            }
        }

        let open_leads = self.get_open_leads();
        if !open_leads.is_empty() {
            parts.push(format!("\nOPEN LEADS ({}):", open_leads.len()));
            for l in open_leads.iter().take(5) {
                parts.push(format!("  - [{:.1}] {}", l.priority, l.description));
                if !l.tool.is_empty() {
                    parts.push(format!("    Suggested: {}({})", l.tool, l.query));
                }
            }
        }

        if !self.entities.is_empty() {
            parts.push(format!("\nKEY ENTITIES ({}):", self.entities.len()));
            for entity in self.entities.iter().take(10) {
                parts.push(format!("  - [{}] {}", entity.schema, entity.name()));
            }
        }

        let text = parts.join("\n");
        truncate_with_marker(&text, max_chars)
    }

    /// Machine-readable investigation summary.
    pub fn summary(&self) -> SessionSummary {
        let mut unique_tools: Vec<String> = Vec::new();
        for entry in &self.tool_history {
            if !unique_tools.contains(&entry.tool) {
                unique_tools.push(entry.tool.clone());
            }
        }
        SessionSummary {
            session_id: self.id.clone(),
            goal: self.goal.clone(),
            started_at: self.started_at,
            turns: self.turn_count,
            entity_count: self.entity_count(),
            finding_count: self.finding_count(),
            leads_open: self.get_open_leads().len(),
            leads_total: self.leads.len(),
            tools_used: self.tool_history.len(),
            unique_tools,
        }
    }
}

/// Summary counters, serializable for reports and API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub turns: u32,
    pub entity_count: usize,
    pub finding_count: usize,
    pub leads_open: usize,
    pub leads_total: usize,
    pub tools_used: usize,
    pub unique_tools: Vec<String>,
}

fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    const MARKER: &str = "\n... (truncated)";
    if text.len() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(MARKER.len());
    let mut boundary = keep;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}{MARKER}", &text[..boundary])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
