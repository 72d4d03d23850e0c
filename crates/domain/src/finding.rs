//! Findings and leads — the evidence model of an investigation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::ids;

/// An attested observation produced by one tool call.
///
/// Immutable once added to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    /// Tool that produced this finding.
    pub source: String,
    pub summary: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Entity>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Opaque bag of raw tool output kept for audit.
    #[serde(default)]
    pub raw_data: serde_json::Map<String, serde_json::Value>,
}

impl Finding {
    pub fn new(source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: ids::finding_id(),
            source: source.into(),
            summary: summary.into(),
            entities: Vec::new(),
            relationships: Vec::new(),
            confidence: 0.0,
            timestamp: Utc::now(),
            raw_data: serde_json::Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        let (relationships, nodes): (Vec<_>, Vec<_>) =
            entities.into_iter().partition(Entity::is_relationship);
        self.entities = nodes;
        self.relationships = relationships;
        self
    }
}

/// Follow-up status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Open,
    Investigating,
    Resolved,
    DeadEnd,
}

/// A suggested follow-up attached to a session.
///
/// Mutable only via status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub description: String,
    /// Priority in `[0, 1]`, higher = more urgent.
    pub priority: f64,
    /// Finding id that generated this lead.
    #[serde(default)]
    pub source_finding: String,
    /// Suggested query to follow up with.
    #[serde(default)]
    pub query: String,
    /// Suggested tool to use.
    #[serde(default)]
    pub tool: String,
    pub status: LeadStatus,
    pub timestamp: DateTime<Utc>,
}

impl Lead {
    pub fn new(description: impl Into<String>, priority: f64) -> Self {
        Self {
            id: ids::finding_id(),
            description: description.into(),
            priority: priority.clamp(0.0, 1.0),
            source_finding: String::new(),
            query: String::new(),
            tool: String::new(),
            status: LeadStatus::Open,
            timestamp: Utc::now(),
        }
    }

    pub fn with_suggestion(mut self, tool: impl Into<String>, query: impl Into<String>) -> Self {
        self.tool = tool.into();
        self.query = query.into();
        self
    }

    pub fn from_finding(mut self, finding_id: impl Into<String>) -> Self {
        self.source_finding = finding_id.into();
        self
    }
}
