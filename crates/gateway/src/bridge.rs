//! Investigation bridge — the single entry point adapter layers call.
//!
//! Translates an `/investigate`-style command into an agent run, streams
//! progress back through the adapter's send function, refuses duplicate
//! runs per channel, and applies the publication boundary before
//! anything leaves the system.
//!
//! The bridge is adapter-agnostic: it hands adapters plain text and
//! generic structured payloads, never a platform wire format.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use quarry_agent::{CancelToken, InvestigationAgent, ProgressBus, ProgressSink};
use quarry_domain::config::{AgentConfig, SafetyConfig};
use quarry_domain::ids;
use quarry_providers::ProviderRegistry;
use quarry_safety::SafetyHarness;
use quarry_sessions::{Session, SessionSummary};
use quarry_tools::ToolExecutor;

/// Async text sender supplied by an adapter.
pub type SendFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Result of a bridge-initiated investigation.
#[derive(Clone)]
pub struct InvestigationResult {
    pub session: Session,
    /// Empty on failure.
    pub summary: Option<SessionSummary>,
    pub report_text: String,
    /// The publication-boundary output: guaranteed PII-free.
    pub scrubbed_report_text: String,
    pub pii_scrubbed: usize,
    pub error: String,
}

impl InvestigationResult {
    fn failed(goal: &str, error: impl Into<String>) -> Self {
        Self {
            session: Session::new(goal),
            summary: None,
            report_text: String::new(),
            scrubbed_report_text: String::new(),
            pii_scrubbed: 0,
            error: error.into(),
        }
    }
}

struct ActiveRun {
    goal: String,
    cancel: CancelToken,
}

/// Removes the channel from the active map when the run ends, even on
/// an early return.
struct ChannelGuard<'a> {
    active: &'a Mutex<HashMap<String, ActiveRun>>,
    channel_id: String,
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.channel_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InvestigationBridge {
    agent_config: AgentConfig,
    safety_config: SafetyConfig,
    executor: Arc<ToolExecutor>,
    providers: Arc<ProviderRegistry>,
    bus: Arc<ProgressBus>,
    /// channel_id → running session handle.
    active: Mutex<HashMap<String, ActiveRun>>,
}

impl InvestigationBridge {
    pub fn new(
        agent_config: AgentConfig,
        safety_config: SafetyConfig,
        executor: Arc<ToolExecutor>,
        providers: Arc<ProviderRegistry>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            agent_config,
            safety_config,
            executor,
            providers,
            bus,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Whether a channel currently has a running investigation.
    pub fn is_channel_active(&self, channel_id: &str) -> bool {
        self.active.lock().contains_key(channel_id)
    }

    /// Cancel the run owning a channel, if any.
    pub fn cancel_channel(&self, channel_id: &str) -> bool {
        match self.active.lock().get(channel_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    // ── Primitive path ───────────────────────────────────────────────

    /// Run a full investigation and return results. Adapters and API
    /// endpoints both ultimately come through here.
    pub async fn run_investigation(
        &self,
        goal: &str,
        config: Option<AgentConfig>,
    ) -> InvestigationResult {
        let cancel = CancelToken::new();
        self.run_with_sink(goal, config, ProgressSink::disabled(), &cancel)
            .await
    }

    /// Primitive path with progress published on the bus under
    /// `investigation_id` (used by the HTTP/WS surfaces).
    pub async fn run_streaming(
        &self,
        goal: &str,
        config: Option<AgentConfig>,
        investigation_id: &str,
        cancel: &CancelToken,
    ) -> InvestigationResult {
        let sink = ProgressSink::new(self.bus.clone(), investigation_id);
        self.run_with_sink(goal, config, sink, cancel).await
    }

    async fn run_with_sink(
        &self,
        goal: &str,
        config: Option<AgentConfig>,
        sink: ProgressSink,
        cancel: &CancelToken,
    ) -> InvestigationResult {
        let config = config.unwrap_or_else(|| self.agent_config.clone());
        let agent = match InvestigationAgent::from_parts(
            config,
            self.executor.clone(),
            &self.providers,
            &self.safety_config,
        ) {
            Ok(agent) => agent,
            Err(e) => {
                tracing::error!(goal, error = %e, "investigation rejected");
                sink.close();
                return InvestigationResult::failed(goal, e.to_string());
            }
        };

        let session = agent.investigate(goal, cancel, &sink).await;
        let summary = session.summary();
        let report_text = quarry_agent::report::build_report(&session);

        // Publication boundary: a fully-enabled harness, regardless of
        // what the loop ran under.
        let harness = SafetyHarness::from_defaults();
        let publication = harness.scrub_for_publication(&report_text, "adapter_report");

        InvestigationResult {
            session,
            summary: Some(summary),
            report_text,
            scrubbed_report_text: publication.scrubbed_text,
            pii_scrubbed: publication.pii_found,
            error: String::new(),
        }
    }

    // ── Channel-scoped path ──────────────────────────────────────────

    /// Handle an `/investigate` command from any adapter.
    ///
    /// Serializes per `channel_id` (a duplicate is refused without
    /// starting a second run), streams progress as text through
    /// `send_fn`, and emits the scrubbed report at the end. The channel
    /// is always deregistered on exit.
    pub async fn handle_investigate_command(
        &self,
        goal: &str,
        channel_id: &str,
        send_fn: SendFn,
    ) -> InvestigationResult {
        let cancel = CancelToken::new();

        // Atomic check-and-insert on the active-channel map.
        let duplicate_goal = {
            let mut active = self.active.lock();
            if let Some(existing) = active.get(channel_id) {
                Some(existing.goal.clone())
            } else {
                active.insert(
                    channel_id.to_string(),
                    ActiveRun {
                        goal: goal.to_string(),
                        cancel: cancel.clone(),
                    },
                );
                None
            }
        };
        if let Some(running_goal) = duplicate_goal {
            send_fn(format!(
                "Investigation already running in this channel: '{running_goal}'"
            ))
            .await;
            return InvestigationResult::failed(
                goal,
                "Investigation already running in this channel",
            );
        }
        let _guard = ChannelGuard {
            active: &self.active,
            channel_id: channel_id.to_string(),
        };

        send_fn(format!("Starting investigation: {goal}")).await;

        // Stream progress events as text while the loop runs.
        let stream_key = format!("channel:{channel_id}:{}", ids::session_id());
        let mut events = self.bus.subscribe(&stream_key);
        let progress_send = send_fn.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.is_terminal() {
                    break;
                }
                progress_send(event.render_text()).await;
            }
        });

        let result = self
            .run_streaming(goal, None, &stream_key, &cancel)
            .await;
        let _ = forwarder.await;

        if !result.error.is_empty() {
            send_fn(format!("Investigation failed: {}", result.error)).await;
        } else {
            // Publication boundary: only the scrubbed report leaves.
            send_fn(result.scrubbed_report_text.clone()).await;
            if result.pii_scrubbed > 0 {
                send_fn(format!(
                    "{} PII items redacted from report",
                    result.pii_scrubbed
                ))
                .await;
            }
        }

        result
    }

    // ── Generic adapter payloads ─────────────────────────────────────

    /// Block-family payload (header/section/context blocks). Adapters
    /// map this onto their own wire format.
    pub fn format_blocks(&self, result: &InvestigationResult) -> serde_json::Value {
        if !result.error.is_empty() {
            return serde_json::json!({
                "text": format!("Investigation failed: {}", result.error),
                "blocks": [
                    { "type": "section", "text": format!("Investigation failed: {}", result.error) },
                ],
            });
        }

        let summary = result.session.summary();
        let mut blocks = vec![
            serde_json::json!({
                "type": "header",
                "text": format!("Investigation: {}", result.session.goal),
            }),
            serde_json::json!({
                "type": "section",
                "fields": [
                    format!("Entities: {}", summary.entity_count),
                    format!("Findings: {}", summary.finding_count),
                    format!("Turns: {}", summary.turns),
                    format!("Leads: {} open", summary.leads_open),
                ],
            }),
        ];

        if !result.session.findings().is_empty() {
            let findings: Vec<String> = result
                .session
                .findings()
                .iter()
                .take(5)
                .map(|f| format!("• [{}] {}", f.source, truncate(&f.summary, 100)))
                .collect();
            blocks.push(serde_json::json!({
                "type": "section",
                "text": format!("Findings:\n{}", findings.join("\n")),
            }));
        }

        let open_leads = result.session.get_open_leads();
        if !open_leads.is_empty() {
            let leads: Vec<String> = open_leads
                .iter()
                .take(3)
                .map(|l| format!("• {}", truncate(&l.description, 80)))
                .collect();
            blocks.push(serde_json::json!({
                "type": "section",
                "text": format!("Open leads:\n{}", leads.join("\n")),
            }));
        }

        if result.pii_scrubbed > 0 {
            blocks.push(serde_json::json!({
                "type": "context",
                "text": format!("{} PII items redacted", result.pii_scrubbed),
            }));
        }

        serde_json::json!({
            "text": result.scrubbed_report_text,
            "blocks": blocks,
        })
    }

    /// Embed-family payload (title/description/fields/footer).
    pub fn format_embed(&self, result: &InvestigationResult) -> serde_json::Value {
        if !result.error.is_empty() {
            return serde_json::json!({
                "title": "Investigation failed",
                "description": result.error,
            });
        }

        let summary = result.session.summary();
        let mut fields = vec![
            serde_json::json!({ "name": "Entities", "value": summary.entity_count.to_string(), "inline": true }),
            serde_json::json!({ "name": "Findings", "value": summary.finding_count.to_string(), "inline": true }),
            serde_json::json!({ "name": "Turns", "value": summary.turns.to_string(), "inline": true }),
        ];

        if !result.session.findings().is_empty() {
            let findings: Vec<String> = result
                .session
                .findings()
                .iter()
                .take(5)
                .map(|f| format!("• [{}] {}", f.source, truncate(&f.summary, 80)))
                .collect();
            fields.push(serde_json::json!({
                "name": "Key Findings",
                "value": findings.join("\n"),
                "inline": false,
            }));
        }

        let mut embed = serde_json::json!({
            "title": result.session.goal,
            "description": format!(
                "Investigation complete — {} leads remaining",
                summary.leads_open
            ),
            "fields": fields,
        });

        if result.pii_scrubbed > 0 {
            embed["footer"] =
                serde_json::json!({ "text": format!("{} PII items redacted", result.pii_scrubbed) });
        }

        embed
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut boundary = max;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}…", &text[..boundary])
}
