//! The bounded agent loop: seed → decide/execute → finalize.
//!
//! One logical task per investigation. Suspension points are tool
//! execution, policy calls, and the rate-limit wait; cancellation is
//! checked after each of them and session mutation never straddles a
//! suspension. Tool-level errors degrade into failed turns and never
//! escape the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::Instrument;

use quarry_domain::config::{AgentConfig, SafetyConfig};
use quarry_domain::finding::{Lead, LeadStatus};
use quarry_domain::progress::ProgressEvent;
use quarry_domain::tool::{result_is_error, ToolArgs, ToolResult};
use quarry_domain::{Error, Result};
use quarry_providers::ProviderRegistry;
use quarry_safety::SafetyHarness;
use quarry_sessions::{codec, Session};
use quarry_tools::ToolExecutor;

use crate::bus::ProgressSink;
use crate::cancel::CancelToken;
use crate::ingest;
use crate::policy::{Action, Decision, DecisionPolicy, HeuristicPolicy, LlmPolicy};

/// Cap on the serialized result text handed to the post-check.
const RESULT_TEXT_CAP: usize = 16_000;

/// Upper bound on the single rate-limit wait per turn.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Nominal per-call cost fed to the policy gate's budget.
fn action_cost(tool: &str) -> f64 {
    match tool {
        "screen_sanctions" | "check_news" => 0.5,
        "build_graph" => 0.2,
        _ => 1.0,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step bookkeeping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum StepStatus {
    Completed,
    Failed,
    Blocked,
}

struct StepOutcome {
    status: StepStatus,
    /// `(source, summary, confidence)` when a finding was added.
    finding: Option<(String, String, f64)>,
    /// `(description, priority)` per derived lead.
    leads: Vec<(String, f64)>,
    produced_entities: bool,
}

impl StepOutcome {
    fn without_finding(status: StepStatus) -> Self {
        Self {
            status,
            finding: None,
            leads: Vec::new(),
            produced_entities: false,
        }
    }
}

enum LoopExit {
    Concluded,
    BudgetExhausted,
    Cancelled(&'static str),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// InvestigationAgent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InvestigationAgent {
    config: AgentConfig,
    executor: Arc<ToolExecutor>,
    harness: Arc<SafetyHarness>,
    policy: Arc<dyn DecisionPolicy>,
}

impl InvestigationAgent {
    /// Build an agent from explicit parts. The config is validated here,
    /// before any loop starts.
    pub fn new(
        config: AgentConfig,
        executor: Arc<ToolExecutor>,
        harness: Arc<SafetyHarness>,
        policy: Arc<dyn DecisionPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            harness,
            policy,
        })
    }

    /// Standard wiring: harness per `enable_safety`, policy per
    /// `demo_mode`/`llm_provider`. Unknown provider ids are rejected
    /// here, before the loop starts.
    pub fn from_parts(
        config: AgentConfig,
        executor: Arc<ToolExecutor>,
        providers: &ProviderRegistry,
        safety: &SafetyConfig,
    ) -> Result<Self> {
        let harness = if config.enable_safety {
            Arc::new(SafetyHarness::from_config(safety))
        } else {
            Arc::new(SafetyHarness::disabled())
        };

        let policy = standard_policy(&config, &executor, providers)?;
        Self::new(config, executor, harness, policy)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn harness(&self) -> &Arc<SafetyHarness> {
        &self.harness
    }

    /// Run one investigation to completion.
    ///
    /// Always returns the session — tool failures degrade into failed
    /// turns, and cancellation/deadline return the partial session after
    /// an abbreviated finalize. The terminal progress event is emitted
    /// and the sink closed before returning.
    pub async fn investigate(
        &self,
        goal: &str,
        cancel: &CancelToken,
        sink: &ProgressSink,
    ) -> Session {
        let session = Session::new(goal);
        let span = tracing::info_span!("investigation", session_id = %session.id);
        self.run(session, cancel, sink).instrument(span).await
    }

    /// Continue a previously saved session. The seed phase is skipped
    /// when the session already has tool history.
    pub async fn resume(
        &self,
        session: Session,
        cancel: &CancelToken,
        sink: &ProgressSink,
    ) -> Session {
        let span = tracing::info_span!("investigation", session_id = %session.id, resumed = true);
        self.run(session, cancel, sink).instrument(span).await
    }

    async fn run(&self, mut session: Session, cancel: &CancelToken, sink: &ProgressSink) -> Session {
        sink.emit(ProgressEvent::Started {
            id: session.id.clone(),
            goal: session.goal.clone(),
        });

        if session.goal.trim().is_empty() {
            session.record_reasoning("Refusing to start: investigation goal is empty");
            sink.emit(ProgressEvent::Completed {
                summary: summary_value(&session),
            });
            sink.close();
            return session;
        }

        let deadline = self
            .config
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        // ── Phase 1: seed (counts as zero turns; skipped on resume) ──
        if session.tool_history().is_empty() {
            self.seed(&mut session, cancel, sink).await;
            if cancel.is_cancelled() {
                return self.abort(session, sink, "aborted by caller").await;
            }
        }

        // ── Phase 2: decide–execute ──────────────────────────────────
        let exit = self.drive_turns(&mut session, cancel, sink, deadline).await;

        // ── Phase 3: finalize ────────────────────────────────────────
        match exit {
            LoopExit::Cancelled(reason) => {
                let note = if reason == "deadline" {
                    "Investigation deadline exceeded; returning partial session"
                } else {
                    "Investigation aborted by caller"
                };
                session.record_reasoning(note);
                self.finalize(&mut session, false).await;
                sink.emit(ProgressEvent::Error {
                    message: reason.to_string(),
                });
                sink.close();
                tracing::info!(session_id = %session.id, reason, "investigation terminated early");
                session
            }
            LoopExit::Concluded | LoopExit::BudgetExhausted => {
                if matches!(exit, LoopExit::BudgetExhausted) {
                    session.record_reasoning(format!(
                        "Turn budget exhausted after {} turns",
                        session.turn_count
                    ));
                }
                self.finalize(&mut session, true).await;
                sink.emit(ProgressEvent::Completed {
                    summary: summary_value(&session),
                });
                sink.close();
                tracing::info!(
                    session_id = %session.id,
                    turns = session.turn_count,
                    findings = session.finding_count(),
                    entities = session.entity_count(),
                    "investigation completed"
                );
                session
            }
        }
    }

    // ── Seed phase ───────────────────────────────────────────────────

    async fn seed(&self, session: &mut Session, cancel: &CancelToken, sink: &ProgressSink) {
        let mut args = ToolArgs::new();
        args.insert("query".into(), Value::String(session.goal.clone()));
        args.insert("limit".into(), Value::from(20u64));
        let action = Action::new(
            "search_entities",
            args,
            "Seeding entity search from the goal",
        );
        session.record_reasoning(action.reasoning.clone());

        let Some(outcome) = self.run_action(&action, session, cancel).await else {
            return;
        };
        self.emit_step_events(sink, &outcome);

        if matches!(outcome.status, StepStatus::Completed) && outcome.produced_entities {
            let first_name = session
                .entities()
                .iter()
                .find(|e| !e.is_relationship())
                .map(|e| e.name().to_string())
                .unwrap_or_else(|| session.goal.clone());

            if self.config.auto_sanctions_screen {
                let lead = Lead::new("Screen discovered entities against sanctions watchlists", 0.9)
                    .with_suggestion("screen_sanctions", &first_name);
                sink.emit(ProgressEvent::Lead {
                    description: lead.description.clone(),
                    priority: lead.priority,
                });
                session.add_lead(lead);
            }
            if self.config.auto_news_check {
                let lead = Lead::new("Check recent press coverage of the target", 0.85)
                    .with_suggestion("check_news", session.goal.clone());
                sink.emit(ProgressEvent::Lead {
                    description: lead.description.clone(),
                    priority: lead.priority,
                });
                session.add_lead(lead);
            }
        }
    }

    // ── Decide–execute phase ─────────────────────────────────────────

    async fn drive_turns(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
        sink: &ProgressSink,
        deadline: Option<Instant>,
    ) -> LoopExit {
        loop {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled("aborted by caller");
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return LoopExit::Cancelled("deadline");
            }
            if session.turn_count >= self.config.max_turns {
                return LoopExit::BudgetExhausted;
            }

            // Suspension point: the policy may call out to a model.
            let decision = self.policy.decide(session).await;
            if cancel.is_cancelled() {
                return LoopExit::Cancelled("aborted by caller");
            }

            let action = match decision {
                Decision::Conclude { reasoning } => {
                    session.record_reasoning(format!("Concluding: {reasoning}"));
                    return LoopExit::Concluded;
                }
                Decision::Act(action) => action,
            };

            session.record_reasoning(action.reasoning.clone());
            let Some(outcome) = self.run_action(&action, session, cancel).await else {
                return LoopExit::Cancelled("aborted by caller");
            };

            session.turn_count += 1;
            sink.emit(ProgressEvent::Turn {
                turn: session.turn_count,
                tool: action.tool.clone(),
                reasoning: action.reasoning.clone(),
            });
            self.emit_step_events(sink, &outcome);
        }
    }

    fn emit_step_events(&self, sink: &ProgressSink, outcome: &StepOutcome) {
        if let Some((source, summary, confidence)) = &outcome.finding {
            sink.emit(ProgressEvent::Finding {
                source: source.clone(),
                summary: summary.clone(),
                confidence: *confidence,
            });
        }
        for (description, priority) in &outcome.leads {
            sink.emit(ProgressEvent::Lead {
                description: description.clone(),
                priority: *priority,
            });
        }
    }

    // ── One action through the harness and executor ──────────────────

    /// Returns `None` only when cancelled mid-action; every other
    /// outcome (including tool failure and policy block) is a
    /// `StepOutcome`.
    async fn run_action(
        &self,
        action: &Action,
        session: &mut Session,
        cancel: &CancelToken,
    ) -> Option<StepOutcome> {
        let tool = action.tool.as_str();
        let cost = action_cost(tool);

        let mut verdict = self.harness.pre_check(tool, &action.args, cost);
        if verdict.blocked && verdict.rate_limited {
            // Honor the gate's recommended delay, once per turn.
            if let Some(delay) = verdict.retry_after {
                let wait = delay.min(MAX_RATE_LIMIT_WAIT);
                tracing::info!(tool, wait_ms = wait.as_millis() as u64, "rate limited, retrying after delay");
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(wait) => {}
                }
                verdict = self.harness.pre_check(tool, &action.args, cost);
            }
        }
        if verdict.blocked {
            session.record_reasoning(format!("Skipped '{tool}': {}", verdict.reason));
            if let Some(lead_id) = &action.lead_id {
                session.resolve_lead(lead_id, LeadStatus::DeadEnd);
            }
            return Some(StepOutcome::without_finding(StepStatus::Blocked));
        }

        // Suspension point: tool execution under the per-call deadline.
        let timeout = Duration::from_secs(self.config.tool_timeout_secs);
        let result: Result<ToolResult> = tokio::select! {
            _ = cancel.cancelled() => return None,
            outcome = tokio::time::timeout(timeout, self.executor.execute(tool, &action.args)) => {
                match outcome {
                    Err(_) => Err(Error::Timeout(format!(
                        "tool '{tool}' exceeded {}s deadline",
                        timeout.as_secs()
                    ))),
                    Ok(inner) => inner,
                }
            }
        };

        let result = match result {
            Err(e) => {
                // Post-check the failure text so every invocation has
                // exactly one pre and one post audit entry.
                let _ = self.harness.post_check(&format!("error: {e}"), tool);
                self.harness.report_tool_failure(tool);

                let mut error_result = ToolResult::new();
                error_result.insert("error".into(), Value::String(e.to_string()));
                session.record_tool_use(tool, &action.args, &error_result);
                session.record_reasoning(format!("Tool '{tool}' failed: {e}"));
                if let Some(lead_id) = &action.lead_id {
                    session.resolve_lead(lead_id, LeadStatus::DeadEnd);
                }
                return Some(StepOutcome::without_finding(StepStatus::Failed));
            }
            Ok(result) => result,
        };

        let result_text = truncate_chars(
            &serde_json::to_string(&result).unwrap_or_default(),
            RESULT_TEXT_CAP,
        );
        let post = self.harness.post_check(&result_text, tool);
        if !post.security_flags.is_empty() {
            session.record_reasoning(format!(
                "Security flags on '{tool}' output: {}",
                post.security_flags.join(", ")
            ));
        }

        session.record_tool_use(tool, &action.args, &result);

        if result_is_error(&result) {
            let message = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("tool reported failure");
            self.harness.report_tool_failure(tool);
            session.record_reasoning(format!("Tool '{tool}' reported an error: {message}"));
            if let Some(lead_id) = &action.lead_id {
                session.resolve_lead(lead_id, LeadStatus::DeadEnd);
            }
            return Some(StepOutcome::without_finding(StepStatus::Failed));
        }

        self.harness.report_tool_success(tool);
        self.harness.record_spend(cost);

        let known_before: HashSet<String> =
            session.entities().iter().map(|e| e.id.clone()).collect();
        let finding = ingest::derive_finding(action, &result);
        let finding_brief = (
            finding.source.clone(),
            finding.summary.clone(),
            finding.confidence,
        );
        let produced_entities = !finding.entities.is_empty();
        let snapshot = finding.clone();
        session.add_finding(finding);

        let leads = ingest::derive_leads(&snapshot, &known_before, session);
        let lead_briefs: Vec<(String, f64)> = leads
            .iter()
            .map(|l| (l.description.clone(), l.priority))
            .collect();
        for lead in leads {
            session.add_lead(lead);
        }

        if let Some(lead_id) = &action.lead_id {
            session.resolve_lead(lead_id, LeadStatus::Resolved);
        }

        Some(StepOutcome {
            status: StepStatus::Completed,
            finding: Some(finding_brief),
            leads: lead_briefs,
            produced_entities,
        })
    }

    // ── Finalize phase ───────────────────────────────────────────────

    /// Graph post-processing (completed runs only), audit attachment,
    /// and auto-save. Not cancellable once entered; failures here are
    /// logged and recorded without invalidating the findings.
    async fn finalize(&self, session: &mut Session, run_graph: bool) {
        if run_graph && self.config.generate_graph && self.executor.registry().contains("build_graph")
        {
            let mut args = ToolArgs::new();
            args.insert(
                "entities".into(),
                serde_json::to_value(session.entities()).unwrap_or(Value::Array(Vec::new())),
            );
            match self.executor.execute("build_graph", &args).await {
                Ok(result) => {
                    session.investigation_graph = result.get("graph").cloned();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "graph generation failed");
                    session.record_reasoning(format!("Graph generation failed: {e}"));
                }
            }
        }

        if let Ok(audit) = serde_json::to_value(self.harness.audit_summary()) {
            session.safety_audit = Some(audit);
        }

        if let Some(path) = &self.config.persist_path {
            if let Err(e) = codec::save_session(session, path) {
                tracing::warn!(error = %e, path = %path.display(), "session auto-save failed");
                session.record_reasoning(format!("Session auto-save failed: {e}"));
            }
        }
    }

    async fn abort(&self, mut session: Session, sink: &ProgressSink, reason: &str) -> Session {
        session.record_reasoning("Investigation aborted by caller");
        self.finalize(&mut session, false).await;
        sink.emit(ProgressEvent::Error {
            message: reason.to_string(),
        });
        sink.close();
        session
    }
}

/// The standard policy selection: heuristic in demo/stub mode, LLM with
/// heuristic fallback otherwise.
pub fn standard_policy(
    config: &AgentConfig,
    executor: &Arc<ToolExecutor>,
    providers: &ProviderRegistry,
) -> Result<Arc<dyn DecisionPolicy>> {
    if config.demo_mode || config.llm_provider == "stub" {
        Ok(Arc::new(HeuristicPolicy::new(config.min_findings_to_conclude)))
    } else {
        let provider = providers.get(&config.llm_provider)?;
        Ok(Arc::new(LlmPolicy::new(
            provider,
            executor.registry().names(),
            config.min_findings_to_conclude,
        )))
    }
}

fn summary_value(session: &Session) -> Value {
    serde_json::to_value(session.summary()).unwrap_or(Value::Null)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut boundary = max;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    text[..boundary].to_string()
}
