//! Ingest rules — turning raw tool results into findings and leads.

use std::collections::HashSet;

use quarry_domain::entity::Entity;
use quarry_domain::finding::{Finding, Lead};
use quarry_domain::tool::{classify, result_is_error, ResultKind, ToolResult};
use quarry_sessions::Session;

use crate::policy::Action;

/// Upper bound on leads derived from a single finding.
const MAX_LEADS_PER_FINDING: usize = 5;

/// Baseline confidence per tool, backed off on partial success.
pub fn estimate_confidence(tool: &str, result: &ToolResult) -> f64 {
    let base = match tool {
        "search_entities" => 0.8,
        "screen_sanctions" => 0.85,
        "trace_ownership" => 0.75,
        "build_graph" => 0.7,
        "check_news" => 0.6,
        _ => 0.5,
    };
    if result_is_error(result) || is_empty_result(result) {
        base * 0.5
    } else {
        base
    }
}

fn is_empty_result(result: &ToolResult) -> bool {
    if let Some(count) = result.get("result_count").and_then(serde_json::Value::as_u64) {
        return count == 0;
    }
    for key in ["entities", "matches", "articles"] {
        if let Some(serde_json::Value::Array(items)) = result.get(key) {
            return items.is_empty();
        }
    }
    false
}

/// Human summary for a finding, from the result's top fields.
pub fn build_finding_summary(tool: &str, result: &ToolResult) -> String {
    match classify(result) {
        ResultKind::Entities(entities) => {
            if entities.is_empty() {
                return format!("No entities returned by {tool}");
            }
            let names: Vec<&str> = entities
                .iter()
                .filter(|e| !e.is_relationship())
                .take(3)
                .map(Entity::name)
                .collect();
            let relationships = entities.iter().filter(|e| e.is_relationship()).count();
            let mut summary = format!("Found {} entities", entities.len() - relationships);
            if !names.is_empty() {
                summary.push_str(&format!(": {}", names.join(", ")));
            }
            if relationships > 0 {
                summary.push_str(&format!(" ({relationships} relationships)"));
            }
            summary
        }
        ResultKind::Matches(0) => "No watchlist matches".to_string(),
        ResultKind::Matches(n) => format!("{n} watchlist matches"),
        ResultKind::Articles(n) => format!("{n} articles found"),
        ResultKind::Error(message) => format!("error: {message}"),
        ResultKind::Opaque => {
            if let Some(count) = result.get("result_count").and_then(serde_json::Value::as_u64) {
                format!("{count} results from {tool}")
            } else {
                format!("{} result fields from {tool}", result.len())
            }
        }
    }
}

/// Derive a finding from one executed action.
///
/// The bulky entity payload lives on the finding itself; `raw_data`
/// keeps the remaining result fields for audit.
pub fn derive_finding(action: &Action, result: &ToolResult) -> Finding {
    let entities = match classify(result) {
        ResultKind::Entities(entities) => entities,
        _ => Vec::new(),
    };

    let mut raw_data = result.clone();
    raw_data.remove("entities");

    let mut finding = Finding::new(&action.tool, build_finding_summary(&action.tool, result))
        .with_confidence(estimate_confidence(&action.tool, result))
        .with_entities(entities);
    finding.raw_data = raw_data;
    finding
}

/// Derive follow-up leads for entities this finding newly discovered.
///
/// `known_before` is the entity-id set prior to ingesting the finding;
/// entities already targeted by an existing lead are skipped.
pub fn derive_leads(
    finding: &Finding,
    known_before: &HashSet<String>,
    session: &Session,
) -> Vec<Lead> {
    let mut leads = Vec::new();

    for entity in &finding.entities {
        if leads.len() >= MAX_LEADS_PER_FINDING {
            break;
        }
        if known_before.contains(&entity.id) {
            continue;
        }
        if has_lead_for(session, entity) {
            continue;
        }
        let name = entity.name().to_string();
        let lead = match entity.schema.as_str() {
            "Company" => Lead::new(format!("Trace ownership of {name}"), 0.7)
                .with_suggestion("trace_ownership", &entity.id)
                .from_finding(&finding.id),
            "Person" => Lead::new(format!("Screen {name} against watchlists"), 0.65)
                .with_suggestion("screen_sanctions", &name)
                .from_finding(&finding.id),
            _ => continue,
        };
        leads.push(lead);
    }

    leads
}

fn has_lead_for(session: &Session, entity: &Entity) -> bool {
    let name = entity.name();
    session
        .leads()
        .iter()
        .any(|l| l.query == entity.id || l.query == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_domain::tool::ToolArgs;
    use serde_json::json;

    fn result(value: serde_json::Value) -> ToolResult {
        value.as_object().unwrap().clone()
    }

    fn action(tool: &str) -> Action {
        Action::new(tool, ToolArgs::new(), "test")
    }

    #[test]
    fn confidence_table_with_backoff() {
        let full = result(json!({ "result_count": 3, "entities": [{"id": "a", "schema": "Company"}] }));
        assert_eq!(estimate_confidence("search_entities", &full), 0.8);

        let empty = result(json!({ "result_count": 0, "entities": [] }));
        assert_eq!(estimate_confidence("search_entities", &empty), 0.4);

        let errored = result(json!({ "error": "upstream 503" }));
        assert_eq!(estimate_confidence("check_news", &errored), 0.3);

        let unknown_tool = result(json!({ "result_count": 1 }));
        assert_eq!(estimate_confidence("mystery", &unknown_tool), 0.5);
    }

    #[test]
    fn summary_highlights_entity_names() {
        let r = result(json!({
            "entities": [
                { "id": "c1", "schema": "Company", "properties": { "name": ["Meridian Holdings Ltd"] } },
                { "id": "p1", "schema": "Person", "properties": { "name": ["Viktor Renko"] } },
                { "id": "o1", "schema": "Ownership", "properties": {} },
            ],
        }));
        let summary = build_finding_summary("search_entities", &r);
        assert!(summary.contains("Found 2 entities"));
        assert!(summary.contains("Meridian Holdings Ltd"));
        assert!(summary.contains("1 relationships"));
    }

    #[test]
    fn summary_for_matches_and_articles() {
        assert_eq!(
            build_finding_summary("screen_sanctions", &result(json!({ "matches": [1, 2] }))),
            "2 watchlist matches"
        );
        assert_eq!(
            build_finding_summary("screen_sanctions", &result(json!({ "matches": [] }))),
            "No watchlist matches"
        );
        assert_eq!(
            build_finding_summary("check_news", &result(json!({ "articles": [1, 2, 3] }))),
            "3 articles found"
        );
    }

    #[test]
    fn derive_finding_moves_entities_out_of_raw_data() {
        let r = result(json!({
            "result_count": 1,
            "entities": [{ "id": "c1", "schema": "Company", "properties": { "name": ["Acme"] } }],
            "circular": false,
        }));
        let finding = derive_finding(&action("trace_ownership"), &r);
        assert_eq!(finding.source, "trace_ownership");
        assert_eq!(finding.entities.len(), 1);
        assert!(!finding.raw_data.contains_key("entities"));
        assert!(finding.raw_data.contains_key("circular"));
    }

    #[test]
    fn leads_only_for_new_uncovered_entities() {
        let mut session = Session::new("goal");
        let r = result(json!({
            "entities": [
                { "id": "c1", "schema": "Company", "properties": { "name": ["Acme"] } },
                { "id": "p1", "schema": "Person", "properties": { "name": ["J. Doe"] } },
                { "id": "c2", "schema": "Company", "properties": { "name": ["Old Co"] } },
            ],
        }));
        let finding = derive_finding(&action("search_entities"), &r);

        let known_before: HashSet<String> = ["c2".to_string()].into();
        session.add_finding(finding.clone());

        let leads = derive_leads(&finding, &known_before, &session);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].tool, "trace_ownership");
        assert_eq!(leads[0].query, "c1");
        assert_eq!(leads[1].tool, "screen_sanctions");
        assert_eq!(leads[1].query, "J. Doe");

        // A second pass derives nothing new once the leads exist.
        for lead in leads {
            session.add_lead(lead);
        }
        let again = derive_leads(&finding, &known_before, &session);
        assert!(again.is_empty());
    }

    #[test]
    fn lead_derivation_is_capped() {
        let entities: Vec<serde_json::Value> = (0..10)
            .map(|i| json!({ "id": format!("c{i}"), "schema": "Company", "properties": { "name": [format!("Co {i}")] } }))
            .collect();
        let r = result(json!({ "entities": entities }));
        let finding = derive_finding(&action("search_entities"), &r);
        let session = Session::new("goal");
        let leads = derive_leads(&finding, &HashSet::new(), &session);
        assert_eq!(leads.len(), MAX_LEADS_PER_FINDING);
    }
}
