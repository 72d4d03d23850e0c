//! Decision policies — given a session snapshot, pick the next action.
//!
//! Two interchangeable implementations: a deterministic heuristic with
//! no external dependency, and an LLM-backed policy that degrades to the
//! heuristic on any transport or parse failure. Policies are pure with
//! respect to the session: they read, never mutate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use quarry_domain::tool::ToolArgs;
use quarry_providers::{parse_json_response, CompletionRequest, LlmProvider};
use quarry_sessions::Session;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One executable step chosen by a policy.
#[derive(Debug, Clone)]
pub struct Action {
    pub tool: String,
    pub args: ToolArgs,
    pub reasoning: String,
    /// The open lead that drove this action, when there is one — the
    /// loop resolves it after execution.
    pub lead_id: Option<String>,
}

impl Action {
    pub fn new(tool: impl Into<String>, args: ToolArgs, reasoning: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args,
            reasoning: reasoning.into(),
            lead_id: None,
        }
    }
}

/// The policy's verdict for one turn.
#[derive(Debug, Clone)]
pub enum Decision {
    Act(Action),
    Conclude { reasoning: String },
}

#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn decide(&self, session: &Session) -> Decision;
}

fn query_args(query: &str) -> ToolArgs {
    let mut args = ToolArgs::new();
    args.insert("query".into(), Value::String(query.to_string()));
    args
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heuristic policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic routing with no external dependency.
///
/// Zero findings ⇒ seed an entity search from the goal; a suggested
/// tool on the top open lead ⇒ follow it; no leads and enough findings
/// ⇒ conclude; otherwise fall back to a generic news lookup.
pub struct HeuristicPolicy {
    min_findings_to_conclude: usize,
}

impl HeuristicPolicy {
    pub fn new(min_findings_to_conclude: usize) -> Self {
        Self {
            min_findings_to_conclude,
        }
    }
}

#[async_trait]
impl DecisionPolicy for HeuristicPolicy {
    async fn decide(&self, session: &Session) -> Decision {
        if session.finding_count() == 0 {
            return Decision::Act(Action::new(
                "search_entities",
                query_args(&session.goal),
                "No findings yet; seeding entity search from the goal",
            ));
        }

        if let Some(lead) = session.get_open_leads().first() {
            let query = if lead.query.is_empty() {
                lead.description.clone()
            } else {
                lead.query.clone()
            };
            if !lead.tool.is_empty() {
                let mut action = Action::new(
                    lead.tool.clone(),
                    query_args(&query),
                    format!("Following lead: {}", lead.description),
                );
                action.lead_id = Some(lead.id.clone());
                return Decision::Act(action);
            }
            let mut action = Action::new(
                "check_news",
                query_args(&query),
                format!("Lead has no suggested tool; checking coverage: {}", lead.description),
            );
            action.lead_id = Some(lead.id.clone());
            return Decision::Act(action);
        }

        if session.finding_count() >= self.min_findings_to_conclude {
            return Decision::Conclude {
                reasoning: format!(
                    "No open leads remain after {} findings",
                    session.finding_count()
                ),
            };
        }

        Decision::Act(Action::new(
            "check_news",
            query_args(&session.goal),
            "No leads to follow; broadening with a news lookup",
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const CONTEXT_MAX_CHARS: usize = 4000;

/// Asks a remote model for the next action as JSON; any transport or
/// parse failure degrades to the heuristic.
pub struct LlmPolicy {
    provider: Arc<dyn LlmProvider>,
    tools: Vec<String>,
    fallback: HeuristicPolicy,
}

impl LlmPolicy {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Vec<String>, min_findings_to_conclude: usize) -> Self {
        Self {
            provider,
            tools,
            fallback: HeuristicPolicy::new(min_findings_to_conclude),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the decision policy of an OSINT investigation agent. \
             Given the investigation state, choose the single next step.\n\
             Available tools: {}.\n\
             Reply with JSON only: {{\"tool\": \"<name>\", \"args\": {{...}}, \"reasoning\": \"...\"}}. \
             Use {{\"tool\": \"conclude\", \"reasoning\": \"...\"}} when the investigation is complete.",
            self.tools.join(", ")
        )
    }

    fn interpret(&self, value: &Value) -> Option<Decision> {
        let tool = value.get("tool")?.as_str()?.to_string();
        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("model-chosen step")
            .to_string();
        if tool == "conclude" {
            return Some(Decision::Conclude { reasoning });
        }
        if !self.tools.iter().any(|t| *t == tool) {
            return None;
        }
        let args = match value.get("args") {
            Some(Value::Object(map)) => map.clone(),
            _ => ToolArgs::new(),
        };
        Some(Decision::Act(Action::new(tool, args, reasoning)))
    }

    async fn fallback_decision(&self, session: &Session, cause: &str) -> Decision {
        tracing::warn!(provider = self.provider.provider_id(), cause, "llm policy degraded to heuristic");
        match self.fallback.decide(session).await {
            Decision::Act(mut action) => {
                action.reasoning = format!("(heuristic fallback: {cause}) {}", action.reasoning);
                Decision::Act(action)
            }
            Decision::Conclude { reasoning } => Decision::Conclude {
                reasoning: format!("(heuristic fallback: {cause}) {reasoning}"),
            },
        }
    }
}

#[async_trait]
impl DecisionPolicy for LlmPolicy {
    async fn decide(&self, session: &Session) -> Decision {
        let request = CompletionRequest {
            system: self.system_prompt(),
            prompt: session.context_for_llm(CONTEXT_MAX_CHARS),
            temperature: Some(0.2),
            max_tokens: Some(512),
        };

        let response = match self.provider.complete(request).await {
            Ok(r) => r,
            Err(e) => return self.fallback_decision(session, &format!("provider error: {e}")).await,
        };

        let Some(value) = parse_json_response(&response.text) else {
            return self.fallback_decision(session, "unparseable model reply").await;
        };

        match self.interpret(&value) {
            Some(decision) => decision,
            None => self.fallback_decision(session, "model chose an unknown tool").await,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_domain::entity::Entity;
    use quarry_domain::finding::{Finding, Lead};
    use quarry_providers::StubProvider;

    fn session_with_finding() -> Session {
        let mut session = Session::new("Acme Corp shell companies");
        session.add_finding(
            Finding::new("search_entities", "one hit")
                .with_confidence(0.8)
                .with_entities(vec![
                    Entity::new("c1", "Company").with_property("name", vec!["Acme".into()])
                ]),
        );
        session
    }

    #[tokio::test]
    async fn empty_session_seeds_entity_search() {
        let policy = HeuristicPolicy::new(3);
        let session = Session::new("Acme Corp shell companies");
        match policy.decide(&session).await {
            Decision::Act(action) => {
                assert_eq!(action.tool, "search_entities");
                assert_eq!(action.args["query"], "Acme Corp shell companies");
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn top_lead_with_tool_is_followed() {
        let policy = HeuristicPolicy::new(3);
        let mut session = session_with_finding();
        session.add_lead(Lead::new("low", 0.2).with_suggestion("check_news", "acme"));
        session.add_lead(Lead::new("trace", 0.9).with_suggestion("trace_ownership", "c1"));

        match policy.decide(&session).await {
            Decision::Act(action) => {
                assert_eq!(action.tool, "trace_ownership");
                assert_eq!(action.args["query"], "c1");
                assert!(action.lead_id.is_some());
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concludes_when_no_leads_and_enough_findings() {
        let policy = HeuristicPolicy::new(1);
        let session = session_with_finding();
        assert!(matches!(
            policy.decide(&session).await,
            Decision::Conclude { .. }
        ));
    }

    #[tokio::test]
    async fn falls_back_to_news_when_findings_are_thin() {
        let policy = HeuristicPolicy::new(3);
        let session = session_with_finding();
        match policy.decide(&session).await {
            Decision::Act(action) => assert_eq!(action.tool, "check_news"),
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn llm_policy_parses_model_action() {
        let stub = Arc::new(StubProvider::with_default(
            r#"{"tool": "trace_ownership", "args": {"query": "c1"}, "reasoning": "follow the chain"}"#,
        ));
        let policy = LlmPolicy::new(
            stub,
            vec!["search_entities".into(), "trace_ownership".into()],
            3,
        );
        match policy.decide(&session_with_finding()).await {
            Decision::Act(action) => {
                assert_eq!(action.tool, "trace_ownership");
                assert_eq!(action.reasoning, "follow the chain");
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn llm_policy_conclude_sentinel() {
        let stub = Arc::new(StubProvider::with_default(
            r#"{"tool": "conclude", "reasoning": "saturated"}"#,
        ));
        let policy = LlmPolicy::new(stub, vec!["search_entities".into()], 3);
        assert!(matches!(
            policy.decide(&session_with_finding()).await,
            Decision::Conclude { .. }
        ));
    }

    #[tokio::test]
    async fn llm_policy_degrades_on_garbage() {
        let stub = Arc::new(StubProvider::with_default("I cannot answer in JSON today"));
        let policy = LlmPolicy::new(stub, vec!["search_entities".into(), "check_news".into()], 3);
        // Falls through to the heuristic: thin findings → news lookup.
        match policy.decide(&session_with_finding()).await {
            Decision::Act(action) => {
                assert_eq!(action.tool, "check_news");
                assert!(action.reasoning.contains("heuristic fallback"));
            }
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn llm_policy_rejects_unknown_tool() {
        let stub = Arc::new(StubProvider::with_default(
            r#"{"tool": "rm_rf", "args": {}, "reasoning": "hmm"}"#,
        ));
        let policy = LlmPolicy::new(stub, vec!["search_entities".into(), "check_news".into()], 3);
        match policy.decide(&session_with_finding()).await {
            Decision::Act(action) => assert_ne!(action.tool, "rm_rf"),
            Decision::Conclude { .. } => {}
        }
    }
}
