//! Normalization of `tools/call` results into bounded plain text.

use serde_json::Value;
use toolweave_core::utils::clip_with_marker;

use crate::types::CallToolResult;

/// Shown when a result carries nothing printable.
pub const EMPTY_RESULT: &str = "(empty result)";

fn str_field<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Render one content block. `None` for text blocks with no text.
fn render_part(item: &Value) -> Option<String> {
    let kind = str_field(item, "type").unwrap_or("content");
    match kind {
        "text" => {
            let text = str_field(item, "text")?.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        "image" | "audio" => {
            let mime = str_field(item, "mimeType").unwrap_or(if kind == "image" {
                "image/*"
            } else {
                "audio/*"
            });
            Some(format!("[{kind} {mime} omitted]"))
        }
        "resource_link" => Some(
            match str_field(item, "uri").or_else(|| str_field(item, "resource")) {
                Some(uri) => format!("[resource_link {uri}]"),
                None => "[resource_link omitted]".to_string(),
            },
        ),
        other => Some(format!("[{other} omitted]")),
    }
}

/// Flatten a call result to text and clip it to `max_chars` characters.
pub fn format_call_result(result: &CallToolResult, max_chars: usize) -> String {
    let mut parts: Vec<String> = result.content.iter().filter_map(render_part).collect();

    if let Some(structured) = result.structured_content.as_ref().filter(|v| !v.is_null()) {
        parts.push(structured.to_string());
    }

    let text = parts.join("\n");
    let text = text.trim();
    if text.is_empty() {
        return EMPTY_RESULT.to_string();
    }
    clip_with_marker(text, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(content: Value) -> CallToolResult {
        serde_json::from_value(json!({ "content": content })).unwrap()
    }

    #[test]
    fn test_text_parts_are_trimmed_and_joined() {
        let r = result(json!([
            { "type": "text", "text": "  first  " },
            { "type": "text", "text": "" },
            { "type": "text", "text": "second\n" }
        ]));
        assert_eq!(format_call_result(&r, 1200), "first\nsecond");
    }

    #[test]
    fn test_media_and_links_are_placeholders() {
        let r = result(json!([
            { "type": "image", "data": "AAAA", "mimeType": "image/png" },
            { "type": "audio", "data": "AAAA" },
            { "type": "resource_link", "uri": "file:///tmp/a.txt" },
            { "type": "resource_link" },
            { "type": "resource", "resource": { "uri": "x" } },
            { "data": 1 }
        ]));
        assert_eq!(
            format_call_result(&r, 1200),
            "[image image/png omitted]\n\
             [audio audio/* omitted]\n\
             [resource_link file:///tmp/a.txt]\n\
             [resource_link omitted]\n\
             [resource omitted]\n\
             [content omitted]"
        );
    }

    #[test]
    fn test_structured_content_is_appended() {
        let r: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "sum" }],
            "structuredContent": { "total": 3 }
        }))
        .unwrap();
        assert_eq!(format_call_result(&r, 1200), "sum\n{\"total\":3}");
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(format_call_result(&result(json!([])), 1200), EMPTY_RESULT);
        assert_eq!(
            format_call_result(&result(json!([{ "type": "text", "text": "   " }])), 1200),
            EMPTY_RESULT
        );
    }

    #[test]
    fn test_over_budget_result_is_clipped() {
        let long = "a".repeat(5000);
        let r = result(json!([{ "type": "text", "text": long }]));
        let out = format_call_result(&r, 1200);
        let suffix = "... (truncated, original length 5000)";
        assert!(out.ends_with(suffix));
        assert!(out.chars().count() <= 1200 + suffix.chars().count());
    }
}
