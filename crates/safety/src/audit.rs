//! Safety audit log — one entry per check, attached to the session after
//! the loop terminates.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    Pre,
    Post,
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckOutcome {
    Allow,
    /// A would-be block recorded in observe mode.
    Observe,
    Block,
    Clean,
    Flagged,
}

/// Audit log entry for one safety check.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyEvent {
    pub timestamp: DateTime<Utc>,
    pub mode: CheckMode,
    pub tool: String,
    pub result: CheckOutcome,
    pub details: String,
}

#[derive(Default)]
struct AuditInner {
    events: Vec<SafetyEvent>,
    pii_redactions: usize,
    publication_scrubs: usize,
}

/// Thread-safe audit log shared by all harness checks.
#[derive(Default)]
pub struct AuditLog {
    inner: Mutex<AuditInner>,
}

impl AuditLog {
    pub fn record(&self, mode: CheckMode, tool: &str, result: CheckOutcome, details: impl Into<String>) {
        self.inner.lock().events.push(SafetyEvent {
            timestamp: Utc::now(),
            mode,
            tool: tool.to_string(),
            result,
            details: details.into(),
        });
    }

    pub fn note_pii(&self, detections: usize) {
        if detections > 0 {
            self.inner.lock().pii_redactions += detections;
        }
    }

    pub fn note_publication_scrub(&self, detections: usize) {
        let mut inner = self.inner.lock();
        inner.publication_scrubs += detections;
    }

    pub fn events(&self) -> Vec<SafetyEvent> {
        self.inner.lock().events.clone()
    }

    pub fn summary(&self) -> AuditSummary {
        let inner = self.inner.lock();
        let blocks = inner
            .events
            .iter()
            .filter(|e| e.result == CheckOutcome::Block)
            .count();
        AuditSummary {
            total_checks: inner.events.len(),
            blocks,
            pii_redactions: inner.pii_redactions,
            publication_scrubs: inner.publication_scrubs,
            events: inner
                .events
                .iter()
                .map(|e| AuditEventBrief {
                    check: e.mode,
                    tool: e.tool.clone(),
                    result: e.result,
                })
                .collect(),
        }
    }
}

/// Machine-readable audit summary.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub total_checks: usize,
    pub blocks: usize,
    pub pii_redactions: usize,
    pub publication_scrubs: usize,
    pub events: Vec<AuditEventBrief>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEventBrief {
    pub check: CheckMode,
    pub tool: String,
    pub result: CheckOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_blocks() {
        let log = AuditLog::default();
        log.record(CheckMode::Pre, "search_entities", CheckOutcome::Allow, "");
        log.record(CheckMode::Pre, "check_news", CheckOutcome::Block, "rate limit");
        log.record(CheckMode::Post, "check_news", CheckOutcome::Clean, "");
        log.note_pii(3);
        log.note_publication_scrub(2);

        let summary = log.summary();
        assert_eq!(summary.total_checks, 3);
        assert_eq!(summary.blocks, 1);
        assert_eq!(summary.pii_redactions, 3);
        assert_eq!(summary.publication_scrubs, 2);
        assert_eq!(summary.events.len(), 3);
    }

    #[test]
    fn outcome_serializes_uppercase() {
        let json = serde_json::to_string(&CheckOutcome::Flagged).unwrap();
        assert_eq!(json, "\"FLAGGED\"");
    }
}
