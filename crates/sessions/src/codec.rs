//! Session persistence — versioned JSON save/load for resume and audit.
//!
//! The on-disk document is the authoritative audit artifact. Loading
//! re-indexes entities from findings first (replaying the merge policy),
//! then overlays the standalone entity list for anything a finding never
//! referenced. Unknown top-level keys are ignored; missing optional keys
//! default to empty.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quarry_domain::entity::Entity;
use quarry_domain::finding::{Finding, Lead};
use quarry_domain::{Error, Result};

use crate::session::{Session, ToolUse};

/// Current schema version of the saved document.
pub const SESSION_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    session_id: String,
    goal: String,
    started_at: DateTime<Utc>,
    turn_count: u32,
    #[serde(default)]
    findings: Vec<Finding>,
    #[serde(default)]
    leads: Vec<Lead>,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    tool_history: Vec<ToolUse>,
    #[serde(default)]
    reasoning_trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    investigation_graph: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    safety_audit: Option<Value>,
}

impl SessionDocument {
    fn from_session(session: &Session) -> Self {
        Self {
            version: SESSION_VERSION,
            session_id: session.id.clone(),
            goal: session.goal.clone(),
            started_at: session.started_at,
            turn_count: session.turn_count,
            findings: session.findings.clone(),
            leads: session.leads.clone(),
            entities: session.entities.clone(),
            tool_history: session.tool_history.clone(),
            reasoning_trace: session.reasoning_trace.clone(),
            investigation_graph: session.investigation_graph.clone(),
            safety_audit: session.safety_audit.clone(),
        }
    }

    fn into_session(self) -> Session {
        let mut session = Session::with_id(self.session_id, self.goal);
        session.started_at = self.started_at;
        session.turn_count = self.turn_count;

        // Re-index entities from findings, replaying the merge policy.
        for finding in self.findings {
            session.add_finding(finding);
        }
        // Overlay the standalone arena: picks up entities no finding
        // references; merging already-present ids is a no-op.
        for entity in &self.entities {
            session.upsert_entity(entity);
        }

        session.leads = self.leads;
        session.tool_history = self.tool_history;
        session.reasoning_trace = self.reasoning_trace;
        session.investigation_graph = self.investigation_graph;
        session.safety_audit = self.safety_audit;
        session
    }
}

/// Serialize a session to pretty-printed JSON at `path`.
///
/// Parent directories are created as needed.
pub fn save_session(session: &Session, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let doc = SessionDocument::from_session(session);
    let mut json = serde_json::to_string_pretty(&doc)?;
    json.push('\n');
    std::fs::write(path, json)?;
    tracing::info!(session_id = %session.id, path = %path.display(), "session saved");
    Ok(())
}

/// Load a session saved with [`save_session`].
pub fn load_session(path: &Path) -> Result<Session> {
    let raw = std::fs::read_to_string(path)?;
    let doc: SessionDocument = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidSession(format!("{}: {e}", path.display())))?;
    if doc.version != SESSION_VERSION {
        return Err(Error::InvalidSession(format!(
            "unsupported session version {} (expected {SESSION_VERSION})",
            doc.version
        )));
    }
    let session = doc.into_session();
    tracing::info!(session_id = %session.id, path = %path.display(), "session loaded");
    Ok(session)
}

/// Summary of one saved session file.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSessionInfo {
    pub path: PathBuf,
    pub session_id: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub turns: u32,
    pub entities: usize,
    pub findings: usize,
}

/// List saved sessions in a directory, skipping unreadable files.
pub fn list_sessions(directory: &Path) -> Vec<SavedSessionInfo> {
    let Ok(read_dir) = std::fs::read_dir(directory) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let raw = std::fs::read_to_string(&path).ok()?;
            let doc: SessionDocument = serde_json::from_str(&raw).ok()?;
            Some(SavedSessionInfo {
                session_id: doc.session_id,
                goal: doc.goal,
                started_at: doc.started_at,
                turns: doc.turn_count,
                entities: doc.entities.len(),
                findings: doc.findings.len(),
                path,
            })
        })
        .collect()
}
