//! The single, shared JSON recovery function every LLM-response caller
//! uses (§9: "a single well-tested function with three fallback stages").
//!
//! Grounded on `original_source/memscreen/memory/memory.py`'s inline
//! cleanup pipeline: strip anything before the last blank-line separator
//! (skips a reasoning prelude), strip triple-backtick code fences, trim
//! whitespace, attempt a standard JSON parse, and only on failure fall
//! back to a tolerant Python-dict-like literal extractor.

use serde_json::Value;

/// Remove everything up to and including the last blank-line separator,
/// so a reasoning prelude the model printed before its answer doesn't
/// confuse the parser.
fn strip_before_last_blank_line(input: &str) -> &str {
    match input.rfind("\n\n") {
        Some(pos) => &input[pos + 2..],
        None => input,
    }
}

/// Strip a leading/trailing triple-backtick code fence, with or without a
/// language tag (```json ... ```).
fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].to_string();
        }
        return rest.to_string();
    }
    trimmed.to_string()
}

/// Strip a single stray trailing quote character that sometimes survives a
/// truncated model response, but only if doing so actually produces valid
/// JSON (i.e. we don't blindly mutate well-formed input).
fn strip_stray_trailing_quote(input: &str) -> Option<String> {
    let trimmed = input.trim_end();
    if trimmed.ends_with('"') && serde_json::from_str::<Value>(trimmed).is_err() {
        let candidate = &trimmed[..trimmed.len() - 1];
        if serde_json::from_str::<Value>(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Tolerant fallback for Python-dict-like literals the model sometimes
/// emits instead of strict JSON: single-quoted strings, bare `True`/
/// `False`/`None`, and trailing commas. This is a best-effort textual
/// rewrite, not a full parser; it returns `None` rather than guessing on
/// genuinely ambiguous input.
fn extract_python_dict_like(input: &str) -> Option<Value> {
    let start = input.find(['{', '['])?;
    let mut rewritten = String::with_capacity(input.len() - start);
    let mut chars = input[start..].chars().peekable();
    let mut in_string = false;
    let mut string_quote = '"';
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_string => {
                in_string = true;
                string_quote = '\'';
                rewritten.push('"');
            }
            '\'' if in_string && string_quote == '\'' => {
                in_string = false;
                rewritten.push('"');
            }
            '"' => {
                if !in_string {
                    in_string = true;
                    string_quote = '"';
                } else if string_quote == '"' {
                    in_string = false;
                }
                rewritten.push('"');
            }
            ',' if !in_string => {
                rewritten.push(',');
                // collapse a trailing comma before a closing bracket
                let mut lookahead = chars.clone();
                while let Some(next) = lookahead.peek() {
                    if next.is_whitespace() {
                        lookahead.next();
                    } else {
                        break;
                    }
                }
                if matches!(lookahead.peek(), Some('}') | Some(']')) {
                    rewritten.pop();
                }
            }
            _ => rewritten.push(c),
        }
    }

    let rewritten = rewritten
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null");

    serde_json::from_str(&rewritten).ok()
}

/// Recover a JSON value from a raw LLM response, per the five-step
/// pipeline in §4.2. Returns `None` on total parse failure; the caller is
/// responsible for its own documented safe default.
pub fn recover_json(raw: &str) -> Option<Value> {
    let after_prelude = strip_before_last_blank_line(raw);
    let unfenced = strip_code_fences(after_prelude);
    let trimmed = unfenced.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(fixed) = strip_stray_trailing_quote(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(&fixed) {
            return Some(v);
        }
    }

    extract_python_dict_like(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        let v = recover_json(r#"{"facts": ["a", "b"]}"#).unwrap();
        assert_eq!(v, json!({"facts": ["a", "b"]}));
    }

    #[test]
    fn strips_reasoning_prelude_before_last_blank_line() {
        let raw = "Let me think about this.\n\nHere is more reasoning.\n\n{\"facts\": []}";
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"facts": []}));
    }

    #[test]
    fn strips_code_fences_with_language_tag() {
        let raw = "```json\n{\"facts\": [\"x\"]}\n```";
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"facts": ["x"]}));
    }

    #[test]
    fn strips_code_fences_without_language_tag() {
        let raw = "```\n{\"facts\": [\"x\"]}\n```";
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"facts": ["x"]}));
    }

    #[test]
    fn strips_stray_trailing_quote() {
        let raw = r#"{"facts": ["a"]}""#;
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"facts": ["a"]}));
    }

    #[test]
    fn falls_back_to_python_dict_like_literal() {
        let raw = "{'facts': ['a', 'b'], 'ok': True, 'extra': None,}";
        let v = recover_json(raw).unwrap();
        assert_eq!(v, json!({"facts": ["a", "b"], "ok": true, "extra": null}));
    }

    #[test]
    fn returns_none_on_total_garbage() {
        assert!(recover_json("not json at all, just prose").is_none());
    }
}
