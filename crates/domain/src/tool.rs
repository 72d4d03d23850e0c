//! Tool input/output maps and result classification.
//!
//! A tool is a named asynchronous operation from a string-keyed argument
//! map to a string-keyed result map. The maps stay open on the wire;
//! [`ResultKind`] gives the loop a closed view over the shapes it knows
//! how to ingest.

use serde_json::Value;

use crate::entity::Entity;

/// Unstructured arguments passed to a tool.
pub type ToolArgs = serde_json::Map<String, Value>;

/// Unstructured result returned by a tool.
pub type ToolResult = serde_json::Map<String, Value>;

/// Distinguished result key carrying `"ok"` or `"error"`. When absent,
/// success is inferred from the absence of an error.
pub const STATUS_KEY: &str = "_status";

/// Build an argument map from string pairs.
pub fn args(pairs: &[(&str, &str)]) -> ToolArgs {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
        .collect()
}

/// Whether a result map reports failure.
pub fn result_is_error(result: &ToolResult) -> bool {
    if let Some(Value::String(status)) = result.get(STATUS_KEY) {
        return status == "error";
    }
    result.contains_key("error")
}

/// Closed union over the result shapes the ingest rules understand.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultKind {
    /// Entity records under `entities`.
    Entities(Vec<Entity>),
    /// Match count under `matches`.
    Matches(usize),
    /// Article count under `articles`.
    Articles(usize),
    /// Error message under `error` (or `_status == "error"`).
    Error(String),
    /// Anything else — kept only for audit.
    Opaque,
}

/// Classify a result map into the known shapes.
///
/// Error wins over content keys so a partial failure is not ingested as
/// a clean result.
pub fn classify(result: &ToolResult) -> ResultKind {
    if result_is_error(result) {
        let message = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("tool reported failure")
            .to_string();
        return ResultKind::Error(message);
    }
    if let Some(Value::Array(items)) = result.get("entities") {
        let entities = items
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        return ResultKind::Entities(entities);
    }
    if let Some(Value::Array(items)) = result.get("matches") {
        return ResultKind::Matches(items.len());
    }
    if let Some(Value::Array(items)) = result.get("articles") {
        return ResultKind::Articles(items.len());
    }
    ResultKind::Opaque
}

/// Brief human summary of a tool result, used in the session tool history.
pub fn summarize_result(result: &ToolResult) -> String {
    if let Some(count) = result.get("result_count").and_then(Value::as_u64) {
        return format!("{count} results");
    }
    if let Some(Value::Array(items)) = result.get("entities") {
        return format!("{} entities", items.len());
    }
    if let Some(Value::Array(items)) = result.get("matches") {
        return format!("{} matches", items.len());
    }
    if let Some(Value::Array(items)) = result.get("articles") {
        return format!("{} articles", items.len());
    }
    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return format!("error: {error}");
    }
    format!("{} keys", result.len())
}
