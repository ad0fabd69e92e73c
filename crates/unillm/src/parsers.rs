//! Post-processors for final response content
//!
//! A [`ContentParser`] turns the assembled assistant text into a structured
//! value (`ChatResponse::parsed`). JSON mode uses [`json`] unless the caller
//! supplies their own.

use serde_json::Value;
use std::sync::Arc;

/// Caller-supplied content post-processor
pub type ContentParser = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Parse the content as JSON, tolerating a surrounding markdown code fence
/// or leading prose before the first `{`/`[`.
pub fn json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    if let Some(block) = code_block(trimmed, Some("json")).or_else(|| code_block(trimmed, None)) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// First fenced code block, optionally restricted to a language tag
pub fn code_block(content: &str, language: Option<&str>) -> Option<String> {
    let mut rest = content;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let line_end = after.find('\n')?;
        let tag = after[..line_end].trim();
        let body = &after[line_end + 1..];
        let close = body.find("```")?;

        if language.is_none_or(|lang| tag.eq_ignore_ascii_case(lang)) {
            return Some(body[..close].trim_end_matches('\n').to_string());
        }
        rest = &body[close + 3..];
    }
    None
}

/// Text inside the first `<tag>...</tag>` pair
pub fn xml_tag(content: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)? + start;
    Some(content[start..end].trim().to_string())
}

/// Wrap [`json`] as a [`ContentParser`]
pub fn json_parser() -> ContentParser {
    Arc::new(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_variants() {
        assert_eq!(json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            json("Here you go:\n```json\n{\"a\": [1, 2]}\n```\n"),
            Some(json!({"a": [1, 2]}))
        );
        assert_eq!(json("Sure! {\"ok\": true} hope that helps"), Some(json!({"ok": true})));
        assert_eq!(json("no json here"), None);
    }

    #[test]
    fn test_code_block_language_filter() {
        let text = "```python\nprint(1)\n```\n```rust\nfn main() {}\n```";
        assert_eq!(code_block(text, Some("rust")), Some("fn main() {}".to_string()));
        assert_eq!(code_block(text, None), Some("print(1)".to_string()));
        assert_eq!(code_block(text, Some("go")), None);
    }

    #[test]
    fn test_xml_tag() {
        assert_eq!(
            xml_tag("<answer> 42 </answer>", "answer"),
            Some("42".to_string())
        );
        assert_eq!(xml_tag("<answer>42", "answer"), None);
    }
}
