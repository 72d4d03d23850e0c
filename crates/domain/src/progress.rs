//! Progress events emitted by a running investigation.
//!
//! The loop is the single producer; the progress bus fans events out to
//! subscribers (WebSocket frames, HTTP pollers, chat adapters). The serde
//! representation doubles as the WebSocket wire format.

use serde::{Deserialize, Serialize};

/// A tagged progress message from the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        id: String,
        goal: String,
    },
    Turn {
        turn: u32,
        tool: String,
        reasoning: String,
    },
    Finding {
        source: String,
        summary: String,
        confidence: f64,
    },
    Lead {
        description: String,
        priority: f64,
    },
    Progress {
        message: String,
    },
    Completed {
        summary: serde_json::Value,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Terminal events end the stream and must never be dropped by
    /// backpressure.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed { .. } | ProgressEvent::Error { .. })
    }

    /// Plain-text rendering used by the bridge for adapters that only
    /// accept strings.
    pub fn render_text(&self) -> String {
        match self {
            ProgressEvent::Started { goal, .. } => format!("Investigation started: {goal}"),
            ProgressEvent::Turn { turn, tool, reasoning } => {
                if reasoning.is_empty() {
                    format!("Turn {turn}: {tool}")
                } else {
                    format!("Turn {turn}: {tool} — {reasoning}")
                }
            }
            ProgressEvent::Finding { source, summary, confidence } => {
                format!("Finding [{source}] ({confidence:.2}): {summary}")
            }
            ProgressEvent::Lead { description, priority } => {
                format!("New lead [{priority:.1}]: {description}")
            }
            ProgressEvent::Progress { message } => message.clone(),
            ProgressEvent::Completed { .. } => "Investigation completed".to_string(),
            ProgressEvent::Error { message } => format!("Investigation failed: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(ProgressEvent::Completed { summary: serde_json::json!({}) }.is_terminal());
        assert!(ProgressEvent::Error { message: "x".into() }.is_terminal());
        assert!(!ProgressEvent::Progress { message: "x".into() }.is_terminal());
    }

    #[test]
    fn wire_format_is_type_tagged() {
        let event = ProgressEvent::Turn {
            turn: 3,
            tool: "search_entities".into(),
            reasoning: "seed".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "turn");
        assert_eq!(value["turn"], 3);
    }
}
