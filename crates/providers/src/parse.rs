//! Structured-output parsing for model replies.
//!
//! Models asked for JSON reply with bare JSON, fenced JSON, or prose
//! with an embedded object. This strips fences and falls back to the
//! first balanced object or array in the text.

use serde_json::Value;

/// Parse a JSON object or array out of a model reply.
///
/// Returns `None` when no parseable JSON is found.
pub fn parse_json_response(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // Fenced block: ```json ... ``` or ``` ... ```
    if let Some(inner) = extract_fenced(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            return structured_only(value);
        }
    }

    // Direct parse.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return structured_only(value);
    }

    // First balanced object or array embedded in prose.
    for open in ['{', '['] {
        if let Some(candidate) = extract_balanced(trimmed, open) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return structured_only(value);
            }
        }
    }

    None
}

/// Only objects and arrays count as structured output.
fn structured_only(value: Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value),
        _ => None,
    }
}

fn extract_fenced(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the optional language tag on the opening fence.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn extract_balanced(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        let value = parse_json_response(r#"{"tool": "check_news", "args": {}}"#).unwrap();
        assert_eq!(value["tool"], "check_news");
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here is my decision:\n```json\n{\"tool\": \"conclude\"}\n```\nDone.";
        let value = parse_json_response(reply).unwrap();
        assert_eq!(value["tool"], "conclude");
    }

    #[test]
    fn parses_embedded_object() {
        let reply = "I think we should run {\"tool\": \"trace_ownership\", \"args\": {\"entity_id\": \"c1\"}} next.";
        let value = parse_json_response(reply).unwrap();
        assert_eq!(value["args"]["entity_id"], "c1");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let reply = r#"{"reasoning": "the chain {a -> b} looks circular", "tool": "build_graph"}"#;
        let value = parse_json_response(reply).unwrap();
        assert_eq!(value["tool"], "build_graph");
    }

    #[test]
    fn arrays_parse_too() {
        let value = parse_json_response("[1, 2, 3]").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_json_response("no json here").is_none());
        assert!(parse_json_response("").is_none());
        assert!(parse_json_response("42").is_none());
    }
}
