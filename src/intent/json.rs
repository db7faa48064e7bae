//! Lenient JSON object recovery for model output.
//!
//! Models asked for "a single JSON object" still wrap it in markdown fences
//! or surround it with prose now and then. These helpers recover the object
//! before it is validated.

use serde_json::{Map, Value};

/// Parse `text` as a JSON object, retrying after stripping fences and then
/// after extracting the first balanced `{...}`.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let as_object = |s: &str| match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    as_object(text.trim())
        .or_else(|| as_object(strip_markdown_fences(text).trim()))
        .or_else(|| extract_json_object(text).and_then(as_object))
}

/// Remove a leading ```` ```json ```` (or bare ```` ``` ````) fence line and
/// the closing fence.
pub fn strip_markdown_fences(text: &str) -> String {
    let mut s = text.to_owned();
    if let Some(start) = s.find("```") {
        let fence_end = s[start + 3..]
            .find('\n')
            .map(|i| start + 3 + i + 1)
            .unwrap_or(start + 3);
        s.replace_range(start..fence_end, "");
    }
    if let Some(end) = s.rfind("```") {
        s.replace_range(end..end + 3, "");
    }
    s
}

/// The first balanced `{...}` in `text`, ignoring braces inside strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn plain_object() {
        let map = parse_object(r#"{"intent":"show_tasks","confidence":0.9}"#).unwrap();
        assert_eq!(map["intent"], "show_tasks");
    }

    #[test]
    fn fenced_object() {
        let text = "```json\n{\"intent\":\"show_reminders\",\"confidence\":1}\n```";
        assert_eq!(parse_object(text).unwrap()["intent"], "show_reminders");
    }

    #[test]
    fn object_inside_prose() {
        let text = r#"Sure! Here you go: {"intent":"navigate","target":"/tasks {x}","confidence":0.8} hope that helps"#;
        let map = parse_object(text).unwrap();
        assert_eq!(map["target"], "/tasks {x}");
    }

    #[test]
    fn nested_braces_are_balanced() {
        let text = r#"x {"a":{"b":1},"c":"}"} y"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a":{"b":1},"c":"}"}"#));
    }

    #[test]
    fn arrays_and_garbage_are_rejected() {
        assert!(parse_object("[1,2,3]").is_none());
        assert!(parse_object("no json here").is_none());
        assert!(parse_object(r#"{"unterminated": "#).is_none());
    }
}
