//! Deterministic stub provider for demo mode and tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use quarry_domain::Result;

use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider};

/// Replies with scripted responses, falling back to a default once the
/// script is exhausted.
pub struct StubProvider {
    default_response: String,
    scripted: Mutex<VecDeque<String>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::with_default(r#"{"tool": "conclude", "reasoning": "stub provider default"}"#)
    }

    pub fn with_default(default_response: impl Into<String>) -> Self {
        Self {
            default_response: default_response.into(),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a response to be returned before the default kicks in.
    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted.lock().push_back(response.into());
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for StubProvider {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse> {
        let text = self
            .scripted
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone());
        Ok(CompletionResponse {
            text,
            model: "stub".to_string(),
        })
    }

    fn provider_id(&self) -> &str {
        "stub"
    }
}
