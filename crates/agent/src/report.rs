//! Final report templating.
//!
//! The raw report renders goal, summary counters, findings, and open
//! leads. It contains whatever the tools returned — the publication
//! boundary scrubs it before anything leaves the system.

use quarry_sessions::Session;

pub fn build_report(session: &Session) -> String {
    let summary = session.summary();
    let mut parts = vec![
        format!("**Investigation: {}**", session.goal),
        format!(
            "Turns: {} | Entities: {} | Findings: {}",
            summary.turns, summary.entity_count, summary.finding_count
        ),
        String::new(),
    ];

    if !session.findings().is_empty() {
        parts.push("**Findings:**".to_string());
        for finding in session.findings() {
            parts.push(format!("• [{}] {}", finding.source, finding.summary));
        }
        parts.push(String::new());
    }

    let open_leads = session.get_open_leads();
    if !open_leads.is_empty() {
        parts.push(format!("**Open leads:** {}", open_leads.len()));
        for lead in open_leads.iter().take(3) {
            parts.push(format!("• {}", lead.description));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}
