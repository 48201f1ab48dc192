//! Best-effort structured output extraction from raw model replies.
//!
//! Models asked for JSON routinely wrap it in markdown fences, prepend
//! prose, or emit trailing commentary. This module is the central resilience
//! primitive of the pipeline: every stage parses its output through
//! [`parse_or_default`], which never fails. A malformed reply degrades that
//! one stage to its declared safe default instead of failing the request.
//!
//! Parse order:
//! 1. strict `serde_json` parse of the raw text,
//! 2. parse after stripping markdown code fences,
//! 3. parse of the first balanced JSON object or array found in the text,
//! 4. the caller-supplied default.

use serde::de::DeserializeOwned;
use tracing::debug;

/// Strip a leading/trailing markdown code fence (``` or ```json) from text.
pub fn clean_json_block(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the language hint on the fence line, if any.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Extract the first balanced JSON object or array embedded in free text.
///
/// Tracks string literals and escapes so braces inside strings don't
/// confuse the depth counter. Returns `None` when no balanced candidate
/// exists.
pub fn extract_json(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    let bytes = raw.as_bytes();
    let open = bytes[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
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
                    return Some(raw[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model reply into `T`, falling back to `default` on any failure.
///
/// Never panics, never returns an error. Failures are logged at DEBUG with
/// a prefix of the offending text.
pub fn parse_or_default<T: DeserializeOwned>(raw: &str, default: T) -> T {
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return value;
    }

    let cleaned = clean_json_block(raw);
    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return value;
    }

    if let Some(candidate) = extract_json(&cleaned) {
        if let Ok(value) = serde_json::from_str::<T>(&candidate) {
            return value;
        }
    }

    let prefix: String = raw.chars().take(200).collect();
    debug!(
        response_prefix = %prefix,
        "Structured output parse failed, using stage default"
    );
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Probe {
        name: String,
        #[serde(default)]
        count: u32,
    }

    impl Default for Probe {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                count: 0,
            }
        }
    }

    #[test]
    fn test_strict_parse() {
        let parsed: Probe = parse_or_default(r#"{"name": "a", "count": 2}"#, Probe::default());
        assert_eq!(parsed.name, "a");
        assert_eq!(parsed.count, 2);
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"name\": \"fenced\", \"count\": 1}\n```";
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "fenced");
    }

    #[test]
    fn test_fence_without_language_hint() {
        let raw = "```\n{\"name\": \"bare\"}\n```";
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "bare");
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let raw = "Sure! Here is the plan you asked for:\n{\"name\": \"embedded\", \"count\": 7}\nLet me know if you need changes.";
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "embedded");
        assert_eq!(parsed.count, 7);
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_extraction() {
        let raw = r#"prefix {"name": "tricky } brace", "count": 3} suffix"#;
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "tricky } brace");
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let raw = r#"{"name": "quoted \" inner", "count": 1}"#;
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "quoted \" inner");
    }

    #[test]
    fn test_malformed_returns_default() {
        let parsed: Probe = parse_or_default("not json at all", Probe::default());
        assert_eq!(parsed, Probe::default());
    }

    #[test]
    fn test_unbalanced_returns_default() {
        let parsed: Probe = parse_or_default(r#"{"name": "never closed"#, Probe::default());
        assert_eq!(parsed, Probe::default());
    }

    #[test]
    fn test_empty_input_returns_default() {
        let parsed: Probe = parse_or_default("", Probe::default());
        assert_eq!(parsed, Probe::default());
    }

    #[test]
    fn test_array_extraction() {
        let raw = "The facets are: [1, 2, 3] as requested.";
        let parsed: Vec<u32> = parse_or_default(raw, Vec::new());
        assert_eq!(parsed, vec![1, 2, 3]);
    }

    #[test]
    fn test_wrong_shape_returns_default() {
        // Valid JSON, wrong type for the target
        let parsed: Probe = parse_or_default(r#"[1, 2, 3]"#, Probe::default());
        assert_eq!(parsed, Probe::default());
    }

    #[test]
    fn test_clean_json_block_passthrough() {
        assert_eq!(clean_json_block(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_none_for_plain_text() {
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn test_non_ascii_content() {
        let raw = "voilà: {\"name\": \"boîte à rythmes\", \"count\": 4}";
        let parsed: Probe = parse_or_default(raw, Probe::default());
        assert_eq!(parsed.name, "boîte à rythmes");
    }
}
