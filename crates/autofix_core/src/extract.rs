//! crates/autofix_core/src/extract.rs
//!
//! Extracts the JSON object embedded in free-form LLM output.
//!
//! The scanner walks candidate `{` openers and matches the balanced closing
//! brace with a depth counter that is aware of string literals and escapes,
//! so braces inside string values cannot truncate the object. On success the
//! parsed object is returned verbatim; the expected diagnosis/guide shape is
//! not validated here. On failure callers get a taxonomy-specific fallback,
//! so downstream code never branches on a parse failure explicitly.

use serde_json::{json, Value};

use crate::domain::IssueSeverity;

/// Finds the first balanced, parseable JSON object anywhere in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let open = search_from + offset;
        if let Some(end) = balanced_object_end(text, open) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[open..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
        search_from = open + 1;
    }
    None
}

/// Returns the byte index of the `}` that closes the object opening at
/// `open`, or `None` if the text ends before the object balances.
fn balanced_object_end(text: &str, open: usize) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[open..].char_indices() {
        let at = open + i;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(at);
                }
            }
            _ => {}
        }
    }
    None
}

/// The structured placeholder used when a diagnosis cannot be parsed.
/// Contains no braces in its string fields, so feeding the rendered
/// fallback back through the parser yields the same shape again.
pub fn fallback_diagnosis(raw: &str) -> Value {
    json!({
        "likely_causes": ["Unable to parse diagnosis"],
        "severity": "unknown",
        "recommended_actions": ["Consult a professional mechanic"],
        "diagnostic_codes": [],
        "explanation": raw,
    })
}

/// Parses a diagnosis payload out of LLM output, degrading to the fallback.
pub fn diagnosis_payload(response: &str) -> Value {
    extract_json(response).unwrap_or_else(|| fallback_diagnosis(response))
}

/// Parses a repair-guide payload out of LLM output; unparseable output is
/// wrapped as `{"raw_guide": <text>}`.
pub fn repair_guide_payload(response: &str) -> Value {
    extract_json(response).unwrap_or_else(|| json!({ "raw_guide": response }))
}

/// Reads the severity tag off a diagnosis payload and coerces it into the
/// closed taxonomy. A missing or unrecognized tag becomes `Medium`.
pub fn severity_of(payload: &Value) -> IssueSeverity {
    payload
        .get("severity")
        .and_then(Value::as_str)
        .map(IssueSeverity::coerce)
        .unwrap_or(IssueSeverity::Medium)
}

/// Reads the diagnostic code list off a diagnosis payload.
/// Non-string entries are skipped.
pub fn diagnostic_codes_of(payload: &Value) -> Vec<String> {
    payload
        .get("diagnostic_codes")
        .and_then(Value::as_array)
        .map(|codes| {
            codes
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let text = r#"Here is my analysis: {"likely_causes":["loose heat shield"],"severity":"low","recommended_actions":["inspect heat shield"],"diagnostic_codes":[],"explanation":"..."} Hope this helps!"#;
        let value = extract_json(text).expect("object should parse");
        assert_eq!(value["severity"], "low");
        assert_eq!(value["likely_causes"][0], "loose heat shield");
    }

    #[test]
    fn handles_braces_inside_string_values() {
        let text = r#"note {"explanation":"replace the {left} bracket","severity":"high"} end"#;
        let value = extract_json(text).expect("object should parse");
        assert_eq!(value["explanation"], "replace the {left} bracket");
        assert_eq!(value["severity"], "high");
    }

    #[test]
    fn handles_escaped_quotes_inside_strings() {
        let text = r#"{"explanation":"the \"knock\" sound {persists}","severity":"low"}"#;
        let value = extract_json(text).expect("object should parse");
        assert_eq!(value["severity"], "low");
    }

    #[test]
    fn skips_non_json_brace_runs_before_the_object() {
        let text = r#"see section {3} then {"severity":"critical","explanation":"brakes"}"#;
        let value = extract_json(text).expect("object should parse");
        assert_eq!(value["severity"], "critical");
    }

    #[test]
    fn nested_objects_are_returned_whole() {
        let text = r#"{"outer":{"inner":{"deep":1}},"severity":"low"}"#;
        let value = extract_json(text).expect("object should parse");
        assert_eq!(value["outer"]["inner"]["deep"], 1);
    }

    #[test]
    fn no_braces_yields_none() {
        assert!(extract_json("no json here at all").is_none());
        assert!(extract_json("").is_none());
    }

    #[test]
    fn unbalanced_object_yields_none() {
        assert!(extract_json(r#"{"severity": "low""#).is_none());
    }

    #[test]
    fn diagnosis_fallback_has_unknown_severity_and_raw_explanation() {
        let raw = "The engine could be misfiring, hard to say.";
        let payload = diagnosis_payload(raw);
        assert_eq!(payload["severity"], "unknown");
        assert_eq!(payload["explanation"], raw);
        assert_eq!(payload["likely_causes"][0], "Unable to parse diagnosis");
        assert_eq!(
            payload["recommended_actions"][0],
            "Consult a professional mechanic"
        );
        assert_eq!(payload["diagnostic_codes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn parsing_the_rendered_fallback_is_idempotent() {
        let first = diagnosis_payload("plain prose, nothing parseable");
        // A second pass over the fallback's explanation text (which contains
        // no braces) must produce the same shape again.
        let second = diagnosis_payload(first["explanation"].as_str().unwrap());
        assert_eq!(first["severity"], second["severity"]);
        assert_eq!(first["likely_causes"], second["likely_causes"]);
        assert_eq!(first["recommended_actions"], second["recommended_actions"]);
    }

    #[test]
    fn malformed_but_parseable_objects_are_accepted_verbatim() {
        let payload = diagnosis_payload(r#"{"foo": 1}"#);
        assert_eq!(payload, json!({"foo": 1}));
        // The taxonomy projection still degrades gracefully.
        assert_eq!(severity_of(&payload), IssueSeverity::Medium);
        assert!(diagnostic_codes_of(&payload).is_empty());
    }

    #[test]
    fn repair_guide_falls_back_to_raw_guide() {
        let payload = repair_guide_payload("just do it carefully");
        assert_eq!(payload["raw_guide"], "just do it carefully");

        let structured = repair_guide_payload(r#"{"Tools Required": ["socket set"]}"#);
        assert_eq!(structured["Tools Required"][0], "socket set");
    }

    #[test]
    fn severity_projection_coerces_outside_taxonomy() {
        let payload = json!({"severity": "catastrophic"});
        assert_eq!(severity_of(&payload), IssueSeverity::Medium);
        let payload = json!({"severity": "critical"});
        assert_eq!(severity_of(&payload), IssueSeverity::Critical);
    }

    #[test]
    fn diagnostic_codes_projection_skips_non_strings() {
        let payload = json!({"diagnostic_codes": ["P0300", 42, "P0171"]});
        assert_eq!(diagnostic_codes_of(&payload), vec!["P0300", "P0171"]);
    }
}
