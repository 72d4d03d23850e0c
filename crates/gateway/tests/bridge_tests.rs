//! Bridge and API-surface tests: channel dedup, progress streaming,
//! publication scrubbing on export.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use parking_lot::Mutex;

use quarry_domain::config::{AgentConfig, Config};
use quarry_domain::entity::Entity;
use quarry_domain::finding::Finding;
use quarry_domain::tool::{ToolArgs, ToolResult};
use quarry_domain::{Error, Result};
use quarry_gateway::api::investigations::export;
use quarry_gateway::bridge::{InvestigationBridge, SendFn};
use quarry_gateway::investigations::{InvestigationRecord, InvestigationStore};
use quarry_gateway::state::AppState;
use quarry_providers::ProviderRegistry;
use quarry_sessions::Session;
use quarry_tools::{InstanceCache, Tool, ToolExecutor, ToolRegistry};

fn demo_state(max_turns: u32) -> AppState {
    let mut config = Config::default();
    config.agent.max_turns = max_turns;
    config.agent.demo_mode = true;
    AppState::from_config(config).unwrap()
}

fn capture_send() -> (SendFn, Arc<Mutex<Vec<String>>>) {
    let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let send_fn: SendFn = Arc::new(move |text: String| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().push(text);
        })
    });
    (send_fn, captured)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Primitive path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn run_investigation_returns_scrubbed_report() {
    let state = demo_state(3);
    let result = state
        .bridge
        .run_investigation("Meridian Holdings", None)
        .await;

    assert!(result.error.is_empty());
    let summary = result.summary.as_ref().expect("summary present");
    assert!(summary.turns >= 1);
    assert!(result.report_text.contains("Meridian Holdings"));
    assert!(result
        .scrubbed_report_text
        .contains("**Investigation: Meridian Holdings**"));
}

#[tokio::test]
async fn invalid_config_fails_without_running() {
    let state = demo_state(3);
    let config = AgentConfig {
        max_turns: 10_000,
        ..AgentConfig::default()
    };
    let result = state
        .bridge
        .run_investigation("goal", Some(config))
        .await;

    assert!(!result.error.is_empty());
    assert!(result.summary.is_none());
    assert_eq!(result.session.finding_count(), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel-scoped path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn channel_command_streams_and_reports() {
    let state = demo_state(2);
    let (send_fn, captured) = capture_send();

    let result = state
        .bridge
        .handle_investigate_command("Meridian Holdings", "C100", send_fn)
        .await;

    assert!(result.error.is_empty());
    let messages = captured.lock();
    assert!(messages[0].contains("Starting investigation"));
    // Progress lines precede the final scrubbed report.
    assert!(messages.len() >= 2);
    assert!(messages
        .iter()
        .any(|m| m.contains("**Investigation: Meridian Holdings**")));
    // The channel is free again afterwards.
    assert!(!state.bridge.is_channel_active("C100"));
}

struct SlowSearch;

#[async_trait]
impl Tool for SlowSearch {
    fn name(&self) -> &str {
        "search_entities"
    }
    fn description(&self) -> &str {
        "slow search"
    }
    async fn execute(&self, _args: &ToolArgs) -> Result<ToolResult> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(Error::Other("should have been cancelled".into()))
    }
}

fn slow_bridge() -> Arc<InvestigationBridge> {
    let registry = Arc::new(ToolRegistry::new());
    registry.register(Arc::new(SlowSearch));
    let executor = Arc::new(ToolExecutor::new(
        registry,
        Arc::new(InstanceCache::new()),
        Duration::from_secs(30),
    ));
    let providers =
        Arc::new(ProviderRegistry::from_config(&quarry_domain::config::LlmConfig::default()).unwrap());
    let config = AgentConfig {
        demo_mode: true,
        ..AgentConfig::default()
    };
    Arc::new(InvestigationBridge::new(
        config,
        quarry_domain::config::SafetyConfig::default(),
        executor,
        providers,
        Arc::new(quarry_agent::ProgressBus::new()),
    ))
}

#[tokio::test]
async fn duplicate_channel_is_refused_without_starting() {
    let bridge = slow_bridge();

    // Occupy the channel with a long-running investigation.
    let (first_send, _first_captured) = capture_send();
    let busy_bridge = bridge.clone();
    let first = tokio::spawn(async move {
        busy_bridge
            .handle_investigate_command("first goal", "busy", first_send)
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bridge.is_channel_active("busy"));

    // A second command on the same channel is refused outright.
    let (second_send, second_captured) = capture_send();
    let result = bridge
        .handle_investigate_command("x", "busy", second_send)
        .await;

    assert!(!result.error.is_empty());
    let messages = second_captured.lock();
    assert!(messages[0].contains("already running"));
    assert!(messages[0].contains("first goal"));
    // The original registration is untouched.
    assert!(bridge.is_channel_active("busy"));
    drop(messages);

    // Other channels still parallelize: cancel the first run and let it
    // finish.
    assert!(bridge.cancel_channel("busy"));
    let first_result = tokio::time::timeout(Duration::from_secs(2), first)
        .await
        .expect("first run must end after cancel")
        .unwrap();
    assert!(first_result.error.is_empty());
    assert!(!bridge.is_channel_active("busy"));
}

#[tokio::test]
async fn distinct_channels_run_in_parallel() {
    let state = demo_state(1);
    let (send_a, _) = capture_send();
    let (send_b, _) = capture_send();

    let bridge_a = state.bridge.clone();
    let bridge_b = state.bridge.clone();
    let (a, b) = tokio::join!(
        bridge_a.handle_investigate_command("goal a", "chan-a", send_a),
        bridge_b.handle_investigate_command("goal b", "chan-b", send_b),
    );
    assert!(a.error.is_empty());
    assert!(b.error.is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn block_and_embed_payloads_carry_summary_and_pii_note() {
    let state = demo_state(2);
    let mut result = state
        .bridge
        .run_investigation("Meridian Holdings", None)
        .await;
    result.pii_scrubbed = 3;

    let blocks = state.bridge.format_blocks(&result);
    assert_eq!(blocks["blocks"][0]["type"], "header");
    let rendered = blocks.to_string();
    assert!(rendered.contains("3 PII items redacted"));

    let embed = state.bridge.format_embed(&result);
    assert!(embed["fields"].as_array().unwrap().len() >= 3);
    assert_eq!(embed["footer"]["text"], "3 PII items redacted");
}

#[tokio::test]
async fn error_payloads_render_the_failure() {
    let state = demo_state(2);
    let config = AgentConfig {
        max_turns: 10_000,
        ..AgentConfig::default()
    };
    let result = state.bridge.run_investigation("goal", Some(config)).await;

    let blocks = state.bridge.format_blocks(&result);
    assert!(blocks["text"].as_str().unwrap().contains("failed"));
    let embed = state.bridge.format_embed(&result);
    assert_eq!(embed["title"], "Investigation failed");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Export scrubbing (API publication boundary)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn export_scrubs_pii_from_the_report() {
    let state = demo_state(2);

    let mut session = Session::new("badcorp directors");
    session.add_finding(
        Finding::new(
            "search_entities",
            "Director email: john@badcorp.com, SSN: 123-45-6789",
        )
        .with_confidence(0.9)
        .with_entities(vec![Entity::new("bc1", "Company")
            .with_property("name", vec!["BadCorp".into()])]),
    );

    // The raw session keeps the PII verbatim.
    assert!(session.findings()[0].summary.contains("john@badcorp.com"));

    let mut record = InvestigationRecord::running("inv-export", "badcorp directors");
    record.complete(session);
    state.investigations.put(record).await;

    let response = export(State(state.clone()), Path("inv-export".to_string())).await;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(!body.contains("john@badcorp.com"));
    assert!(!body.contains("123-45-6789"));
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(value["pii_items_scrubbed"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn export_of_running_investigation_conflicts() {
    let state = demo_state(2);
    state
        .investigations
        .put(InvestigationRecord::running("inv-live", "goal"))
        .await;

    let response = export(State(state.clone()), Path("inv-live".to_string())).await;
    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn export_of_unknown_investigation_is_404() {
    let state = demo_state(2);
    let response = export(State(state.clone()), Path("ghost".to_string())).await;
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}
