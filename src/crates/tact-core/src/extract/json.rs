//! Defensive JSON recovery from model responses
//!
//! Completion models are asked for strict JSON but routinely wrap it in
//! prose or code fences. Recovery tries, in priority order:
//!
//! 1. the whole response as a JSON body,
//! 2. the contents of a fenced code block (```json or bare ```),
//! 3. each balanced delimiter-matched substring, first parseable wins.
//!
//! Failures are the caller's to log; nothing here panics or errors.

use serde_json::Value;

/// Recover a JSON object from a model response.
pub fn extract_json_object(response: &str) -> Option<Value> {
    extract_json(response, '{', '}', Value::is_object)
}

/// Recover a JSON array from a model response.
pub fn extract_json_array(response: &str) -> Option<Value> {
    extract_json(response, '[', ']', Value::is_array)
}

fn extract_json(
    response: &str,
    open: char,
    close: char,
    shape: fn(&Value) -> bool,
) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(response.trim()) {
        if shape(&value) {
            return Some(value);
        }
    }

    if let Some(block) = fenced_block(response) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            if shape(&value) {
                return Some(value);
            }
        }
    }

    balanced_substrings(response, open, close)
        .into_iter()
        .find_map(|candidate| {
            serde_json::from_str::<Value>(candidate)
                .ok()
                .filter(shape)
        })
}

/// The contents of the first fenced code block, preferring a ```json fence.
fn fenced_block(response: &str) -> Option<&str> {
    let rest = match response.find("```json") {
        Some(idx) => &response[idx + "```json".len()..],
        None => {
            let idx = response.find("```")?;
            &response[idx + "```".len()..]
        }
    };
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// Every balanced `open`…`close` substring, outermost first, respecting
/// string literals.
fn balanced_substrings(text: &str, open: char, close: char) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();

    for (i, &(start, c)) in chars.iter().enumerate() {
        if c != open {
            continue;
        }
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for &(pos, c) in &chars[i..] {
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
            if c == '"' {
                in_string = true;
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..pos + close.len_utf8()]);
                    break;
                }
            }
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_body_wins() {
        let value = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn fenced_block_is_second_priority() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\nanything else";
        assert_eq!(extract_json_object(response).unwrap(), json!({"a": 1}));

        let bare = "Sure.\n```\n{\"b\": 2}\n```";
        assert_eq!(extract_json_object(bare).unwrap(), json!({"b": 2}));
    }

    #[test]
    fn brace_scan_survives_nesting_and_prose() {
        let response = r#"The mapping is {"outer": {"inner": 3}} as requested."#;
        assert_eq!(
            extract_json_object(response).unwrap(),
            json!({"outer": {"inner": 3}})
        );
    }

    #[test]
    fn brace_scan_skips_unparseable_candidates() {
        let response = "bad {not json} but later {\"ok\": true} appears";
        assert_eq!(extract_json_object(response).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let response = r#"{"text": "look: } a stray brace"}"#;
        assert_eq!(
            extract_json_object(response).unwrap(),
            json!({"text": "look: } a stray brace"})
        );
    }

    #[test]
    fn arrays_are_recovered_too() {
        let response = "Found these:\n```json\n[{\"value\": 4}]\n```";
        assert_eq!(extract_json_array(response).unwrap(), json!([{"value": 4}]));
    }

    #[test]
    fn hopeless_responses_yield_none() {
        assert!(extract_json_object("no json at all").is_none());
        assert!(extract_json_array("{\"an\": \"object\"}").is_none());
    }
}
