//! Investigation records behind a pluggable store.
//!
//! The HTTP surface keeps one record per triggered investigation. The
//! store is a trait so a durable backing store can substitute for the
//! in-memory map without changing the handlers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use quarry_sessions::{Session, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

/// One triggered investigation, live or finished.
#[derive(Clone)]
pub struct InvestigationRecord {
    pub id: String,
    pub goal: String,
    pub status: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub session: Option<Session>,
    pub summary: Option<SessionSummary>,
    pub error: Option<String>,
}

impl InvestigationRecord {
    pub fn running(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            status: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            session: None,
            summary: None,
            error: None,
        }
    }

    pub fn complete(&mut self, session: Session) {
        self.summary = Some(session.summary());
        self.session = Some(session);
        self.status = RunState::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunState::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Storage behind the investigation API.
#[async_trait]
pub trait InvestigationStore: Send + Sync {
    async fn put(&self, record: InvestigationRecord);
    async fn get(&self, id: &str) -> Option<InvestigationRecord>;
    /// Newest first.
    async fn list(&self) -> Vec<InvestigationRecord>;
}

/// Process-local store used by default.
#[derive(Default)]
pub struct MemoryInvestigationStore {
    records: RwLock<HashMap<String, InvestigationRecord>>,
}

impl MemoryInvestigationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvestigationStore for MemoryInvestigationStore {
    async fn put(&self, record: InvestigationRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    async fn get(&self, id: &str) -> Option<InvestigationRecord> {
        self.records.read().get(id).cloned()
    }

    async fn list(&self) -> Vec<InvestigationRecord> {
        let mut records: Vec<InvestigationRecord> =
            self.records.read().values().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_update() {
        let store = MemoryInvestigationStore::new();
        let record = InvestigationRecord::running("inv1", "goal");
        store.put(record).await;

        let mut fetched = store.get("inv1").await.unwrap();
        assert_eq!(fetched.status, RunState::Running);

        fetched.complete(Session::new("goal"));
        store.put(fetched).await;

        let done = store.get("inv1").await.unwrap();
        assert_eq!(done.status, RunState::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.summary.is_some());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryInvestigationStore::new();
        let mut first = InvestigationRecord::running("a", "first");
        first.started_at = Utc::now() - chrono::Duration::seconds(10);
        store.put(first).await;
        store.put(InvestigationRecord::running("b", "second")).await;

        let listed = store.list().await;
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[1].id, "a");
    }
}
