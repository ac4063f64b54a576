//! Pull a JSON object out of free-form model output

use serde_json::{Map, Value};

/// Byte offset just past the brace that closes the object opened at `start`.
/// Braces inside string literals do not count.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the first well-formed JSON object in `text`.
///
/// Prose before or after, markdown fences, and malformed objects that come
/// earlier are all skipped. Returns `None` when no object parses.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(text, start) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[start..end]) {
                return Some(map);
            }
        }
        search_from = start + 1;
    }
    None
}
