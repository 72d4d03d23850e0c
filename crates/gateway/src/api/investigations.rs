//! Investigation API — trigger and monitor investigations over HTTP.
//!
//! - `POST /api/investigations`             — start (202, runs async)
//! - `GET  /api/investigations/{id}`        — status/results
//! - `GET  /api/investigations?limit&status`— list recent
//! - `POST /api/investigations/{id}/export` — publication-scrubbed export

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quarry_agent::CancelToken;
use quarry_domain::config::{AgentConfig, MAX_TURNS_LIMIT};
use quarry_domain::ids;
use quarry_safety::SafetyHarness;
use quarry_sessions::Session;

use crate::investigations::{InvestigationRecord, InvestigationStore, RunState};
use crate::state::AppState;

use super::api_error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct InvestigationRequest {
    pub goal: String,
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    #[serde(default = "d_provider")]
    pub llm_provider: String,
    #[serde(default = "d_true")]
    pub auto_sanctions: bool,
    #[serde(default = "d_true")]
    pub auto_news: bool,
    #[serde(default)]
    pub dry_run: bool,
}

fn d_max_turns() -> u32 {
    15
}
fn d_provider() -> String {
    "stub".to_string()
}
fn d_true() -> bool {
    true
}

#[derive(Serialize)]
struct StartResponse {
    id: String,
    goal: String,
    status: RunState,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct InvestigationStatus {
    id: String,
    goal: String,
    status: RunState,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    turns: u32,
    entity_count: usize,
    finding_count: usize,
    leads_open: usize,
    leads_total: usize,
    unique_tools: Vec<String>,
    findings: Vec<Value>,
    reasoning_trace: Vec<String>,
    safety_audit: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct InvestigationListItem {
    id: String,
    goal: String,
    status: RunState,
    started_at: DateTime<Utc>,
    entity_count: usize,
    finding_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "d_limit")]
    pub limit: usize,
    #[serde(default)]
    pub status: Option<RunState>,
}

fn d_limit() -> usize {
    20
}

fn findings_view(session: &Session) -> Vec<Value> {
    session
        .findings()
        .iter()
        .map(|f| {
            serde_json::json!({
                "source": f.source,
                "summary": f.summary,
                "confidence": f.confidence,
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/investigations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<InvestigationRequest>,
) -> Response {
    if req.goal.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "goal must not be empty");
    }
    if req.max_turns == 0 || req.max_turns > MAX_TURNS_LIMIT {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("max_turns must be in 1..={MAX_TURNS_LIMIT}"),
        );
    }
    if !state.providers.contains(&req.llm_provider) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("unknown llm_provider '{}'", req.llm_provider),
        );
    }

    let inv_id = ids::session_id();
    let goal = req.goal.clone();
    let record = InvestigationRecord::running(&inv_id, &goal);
    let started_at = record.started_at;
    state.investigations.put(record).await;

    if req.dry_run {
        // Plan only: record the intended seed without executing tools.
        let mut session = Session::new(&goal);
        session.record_reasoning(format!(
            "Dry run: would seed search_entities(\"{goal}\") and follow derived leads for up to {} turns",
            req.max_turns
        ));
        if let Some(mut record) = state.investigations.get(&inv_id).await {
            record.complete(session);
            state.investigations.put(record).await;
        }
    } else {
        spawn_investigation(state.clone(), inv_id.clone(), req);
    }

    (
        StatusCode::ACCEPTED,
        Json(StartResponse {
            id: inv_id,
            goal,
            status: RunState::Running,
            started_at,
        }),
    )
        .into_response()
}

/// Run the investigation in the background, streaming progress on the
/// bus under the investigation id so WebSocket watchers see it live.
pub(crate) fn spawn_investigation(state: AppState, inv_id: String, req: InvestigationRequest) {
    tokio::spawn(async move {
        let config = AgentConfig {
            max_turns: req.max_turns,
            llm_provider: req.llm_provider.clone(),
            auto_sanctions_screen: req.auto_sanctions,
            auto_news_check: req.auto_news,
            ..state.config.agent.clone()
        };

        let cancel = CancelToken::new();
        let result = state
            .bridge
            .run_streaming(&req.goal, Some(config), &inv_id, &cancel)
            .await;

        let Some(mut record) = state.investigations.get(&inv_id).await else {
            return;
        };
        if result.error.is_empty() {
            tracing::info!(
                investigation_id = %inv_id,
                entities = result.session.entity_count(),
                findings = result.session.finding_count(),
                "investigation completed"
            );
            record.complete(result.session);
        } else {
            tracing::warn!(investigation_id = %inv_id, error = %result.error, "investigation failed");
            record.fail(result.error);
        }
        state.investigations.put(record).await;
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/investigations/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.investigations.get(&id).await else {
        return api_error(StatusCode::NOT_FOUND, format!("investigation {id} not found"));
    };

    let (findings, reasoning, audit) = match &record.session {
        Some(session) => (
            findings_view(session),
            session.reasoning_trace().to_vec(),
            session.safety_audit.clone().unwrap_or(Value::Null),
        ),
        None => (Vec::new(), Vec::new(), Value::Null),
    };

    let summary = record.summary.clone();
    let status = InvestigationStatus {
        id: record.id,
        goal: record.goal,
        status: record.status,
        started_at: record.started_at,
        completed_at: record.completed_at,
        turns: summary.as_ref().map_or(0, |s| s.turns),
        entity_count: summary.as_ref().map_or(0, |s| s.entity_count),
        finding_count: summary.as_ref().map_or(0, |s| s.finding_count),
        leads_open: summary.as_ref().map_or(0, |s| s.leads_open),
        leads_total: summary.as_ref().map_or(0, |s| s.leads_total),
        unique_tools: summary.map(|s| s.unique_tools).unwrap_or_default(),
        findings,
        reasoning_trace: reasoning,
        safety_audit: audit,
        error: record.error,
    };

    Json(status).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/investigations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let limit = query.limit.clamp(1, 100);
    let items: Vec<InvestigationListItem> = state
        .investigations
        .list()
        .await
        .into_iter()
        .filter(|r| query.status.map_or(true, |s| r.status == s))
        .take(limit)
        .map(|r| InvestigationListItem {
            id: r.id,
            goal: r.goal,
            status: r.status,
            started_at: r.started_at,
            entity_count: r.summary.as_ref().map_or(0, |s| s.entity_count),
            finding_count: r.summary.as_ref().map_or(0, |s| s.finding_count),
        })
        .collect();

    Json(items).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/investigations/{id}/export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Export with PII scrubbed for publication.
///
/// This is the publication boundary of the HTTP surface — every string
/// leaf of the report is scrubbed. Internal session data is untouched.
pub async fn export(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(record) = state.investigations.get(&id).await else {
        return api_error(StatusCode::NOT_FOUND, format!("investigation {id} not found"));
    };
    if record.status != RunState::Completed {
        return api_error(
            StatusCode::CONFLICT,
            format!("investigation {id} is not completed"),
        );
    }
    let Some(session) = &record.session else {
        return api_error(StatusCode::CONFLICT, format!("investigation {id} has no session"));
    };

    let raw_report = serde_json::json!({
        "goal": session.goal,
        "summary": session.summary(),
        "findings": findings_view(session),
        "entities": session.entities(),
        "reasoning": session.reasoning_trace(),
    });

    let harness = SafetyHarness::from_defaults();
    let (report, pii_scrubbed) = harness.scrub_value_for_publication(&raw_report, "api_export");

    Json(serde_json::json!({
        "id": record.id,
        "goal": record.goal,
        "report": report,
        "pii_items_scrubbed": pii_scrubbed,
    }))
    .into_response()
}
