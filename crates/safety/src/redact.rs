//! PII detection and replacement.
//!
//! Each PII type maps to one stable replacement token, so two identical
//! inputs scrubbed independently always produce identical output. The
//! structured walker additionally treats string values under
//! address-typed or pii-tagged property keys as PII regardless of
//! content — that is how collaborators mark values the regexes cannot
//! recognize.

use regex::Regex;
use serde_json::Value;

/// Property keys whose string values are treated as tagged postal
/// addresses.
const ADDRESS_KEYS: &[&str] = &["address", "addressEntity"];

/// Keys marking a value as PII regardless of shape: `pii` or `pii_*`.
fn is_pii_tagged_key(key: &str) -> bool {
    key == "pii" || key.starts_with("pii_")
}

#[derive(Debug, Clone)]
pub struct RedactionResult {
    pub redacted_text: String,
    pub detections_count: usize,
    pub types_found: Vec<String>,
}

struct Detector {
    pii_type: &'static str,
    token: &'static str,
    pattern: Regex,
}

pub struct PiiRedactor {
    detectors: Vec<Detector>,
}

impl PiiRedactor {
    pub fn new() -> Self {
        let detector = |pii_type, token, pattern: &str| Detector {
            pii_type,
            token,
            pattern: Regex::new(pattern).expect("PII pattern is a valid regex"),
        };
        // Order matters: earlier detectors consume text the later ones
        // would otherwise partially match.
        let detectors = vec![
            detector("email", "[EMAIL]", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            detector("iban", "[IBAN]", r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b"),
            detector("ssn", "[SSN]", r"\b\d{3}-\d{2}-\d{4}\b"),
            detector(
                "phone",
                "[PHONE]",
                r"\b(?:\+?1[-. ])?(?:\(\d{3}\)\s?|\d{3}[-. ])\d{3}[-. ]\d{4}\b",
            ),
            detector("phone", "[PHONE]", r"\+\d{1,3}[-. ]?\d{1,4}(?:[-. ]?\d{2,4}){2,4}"),
        ];
        Self { detectors }
    }

    /// Replace every detection with its type token.
    pub fn redact(&self, text: &str) -> RedactionResult {
        let mut current = text.to_string();
        let mut count = 0;
        let mut types: Vec<String> = Vec::new();

        for d in &self.detectors {
            let matches = d.pattern.find_iter(&current).count();
            if matches == 0 {
                continue;
            }
            count += matches;
            if !types.iter().any(|t| t == d.pii_type) {
                types.push(d.pii_type.to_string());
            }
            current = d.pattern.replace_all(&current, d.token).into_owned();
        }

        RedactionResult {
            redacted_text: current,
            detections_count: count,
            types_found: types,
        }
    }

    /// Count detections without producing scrubbed text.
    pub fn detect(&self, text: &str) -> (usize, Vec<String>) {
        let result = self.redact(text);
        (result.detections_count, result.types_found)
    }

    /// Recursively scrub every string leaf of a JSON value.
    ///
    /// Returns the scrubbed value together with the total detection
    /// count and the types found.
    pub fn redact_value(&self, value: &Value) -> (Value, usize, Vec<String>) {
        let mut count = 0;
        let mut types: Vec<String> = Vec::new();
        let scrubbed = self.walk(value, None, &mut count, &mut types);
        (scrubbed, count, types)
    }

    fn walk(
        &self,
        value: &Value,
        parent_key: Option<&str>,
        count: &mut usize,
        types: &mut Vec<String>,
    ) -> Value {
        match value {
            Value::String(text) => {
                if let Some(key) = parent_key {
                    if ADDRESS_KEYS.contains(&key) {
                        *count += 1;
                        push_unique(types, "address");
                        return Value::String("[ADDRESS]".to_string());
                    }
                    if is_pii_tagged_key(key) {
                        *count += 1;
                        push_unique(types, "tagged");
                        return Value::String("[PII]".to_string());
                    }
                }
                let result = self.redact(text);
                *count += result.detections_count;
                for t in result.types_found {
                    push_unique(types, &t);
                }
                Value::String(result.redacted_text)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, parent_key, count, types))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.walk(item, Some(key), count, types)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for PiiRedactor {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique(types: &mut Vec<String>, t: &str) {
    if !types.iter().any(|existing| existing == t) {
        types.push(t.to_string());
    }
}
