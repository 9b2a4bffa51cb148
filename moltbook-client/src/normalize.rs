use moltscrape_core::{PostRecord, UNKNOWN_AUTHOR};
use serde_json::Value;

/// Convert one raw API post into the fixed internal record shape.
///
/// Pure: all default-substitution rules for the loosely-typed payload live
/// here, and nothing else is touched. Author-registry bookkeeping is a
/// separate explicit step driven by the harvest loop.
///
/// Tolerated payload variants:
/// - `author` / `submolt` may be an object with `name`/`id`, a bare scalar,
///   or absent; absent or empty resolves to the `"unknown"` sentinel.
/// - missing engagement numbers default to 0.
/// - the comment count lives under `comment_count` or `comments`, first
///   present wins.
pub fn normalize(raw: &Value, scraped_at: &str) -> PostRecord {
    let post_id = string_field(raw, "id");

    let (author_name, author_id) = resolve_entity(raw.get("author"));
    let (submolt_name, _) = resolve_entity(raw.get("submolt"));
    let submolt_display = match raw.get("submolt").and_then(|s| s.get("display_name")) {
        Some(Value::String(display)) if !display.is_empty() => display.clone(),
        _ => submolt_name.clone(),
    };

    let upvotes = int_field(raw, "upvotes");
    let downvotes = int_field(raw, "downvotes");
    let comment_count = match raw.get("comment_count") {
        Some(v) => v.as_i64().unwrap_or(0),
        None => int_field(raw, "comments"),
    };

    PostRecord {
        url: format!("https://www.moltbook.com/post/{post_id}"),
        post_id,
        title: string_field(raw, "title"),
        content: string_field(raw, "content"),
        link_url: string_field(raw, "url"),
        author_name,
        author_id,
        submolt: submolt_name,
        submolt_display,
        upvotes,
        downvotes,
        score: upvotes - downvotes,
        comment_count,
        created_at: string_field(raw, "created_at"),
        scraped_at: scraped_at.to_string(),
        is_pinned: raw.get("is_pinned").and_then(Value::as_bool).unwrap_or(false),
        raw_json: raw.to_string(),
    }
}

/// Resolve an author- or submolt-shaped field to `(name, id)`. Handles the
/// object / bare scalar / absent variants.
fn resolve_entity(field: Option<&Value>) -> (String, Option<String>) {
    match field {
        Some(Value::Object(map)) => {
            let name = match map.get("name") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(v) if !v.is_null() && !matches!(v, Value::String(_)) => v.to_string(),
                _ => UNKNOWN_AUTHOR.to_string(),
            };
            let id = match map.get("id") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            (name, id)
        }
        Some(Value::String(s)) if !s.is_empty() => (s.clone(), None),
        Some(v) if !v.is_null() && !matches!(v, Value::String(_)) => (v.to_string(), None),
        _ => (UNKNOWN_AUTHOR.to_string(), None),
    }
}

fn string_field(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(v) if !v.is_null() => v.to_string(),
        _ => String::new(),
    }
}

fn int_field(raw: &Value, key: &str) -> i64 {
    raw.get(key).and_then(Value::as_i64).unwrap_or(0)
}
