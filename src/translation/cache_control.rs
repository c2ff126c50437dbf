// Prompt-cache breakpoint injection for the Claude dialect
//
// Markers tell the vendor where the cached prompt prefix ends. The final
// user message is deliberately left unmarked so a new turn never inherits
// a stale breakpoint.

use serde_json::{json, Value};

/// Inject `cache_control` breakpoints into a built Claude request body.
///
/// Skipped entirely when any marker already exists anywhere in the request
/// (idempotence) or when the conversation holds fewer than two user
/// messages (nothing stable to cache yet).
pub fn inject_cache_breakpoints(body: &mut Value) {
    if contains_cache_control(body) {
        return;
    }

    let user_indices: Vec<usize> = body
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| {
            messages
                .iter()
                .enumerate()
                .filter(|(_, m)| m.get("role").and_then(|r| r.as_str()) == Some("user"))
                .map(|(i, _)| i)
                .collect()
        })
        .unwrap_or_default();
    if user_indices.len() < 2 {
        return;
    }

    let marker = json!({ "type": "ephemeral" });

    // Last tool entry.
    if let Some(tools) = body.get_mut("tools").and_then(|v| v.as_array_mut()) {
        if let Some(last) = tools.last_mut().and_then(|v| v.as_object_mut()) {
            last.insert("cache_control".to_string(), marker.clone());
        }
    }

    // Last rendered system part.
    if let Some(system) = body.get_mut("system").and_then(|v| v.as_array_mut()) {
        if let Some(last) = system.last_mut().and_then(|v| v.as_object_mut()) {
            last.insert("cache_control".to_string(), marker.clone());
        }
    }

    // Last content block of the second-to-last user message.
    let target = user_indices[user_indices.len() - 2];
    if let Some(messages) = body.get_mut("messages").and_then(|v| v.as_array_mut()) {
        if let Some(blocks) = messages[target]
            .get_mut("content")
            .and_then(|v| v.as_array_mut())
        {
            if let Some(last) = blocks.last_mut().and_then(|v| v.as_object_mut()) {
                last.insert("cache_control".to_string(), marker);
            }
        }
    }
}

fn contains_cache_control(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("cache_control")
                || map.values().any(contains_cache_control)
        }
        Value::Array(items) => items.iter().any(contains_cache_control),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Value {
        json!({
            "model": "claude-sonnet-4-5",
            "system": [
                { "type": "text", "text": "be brief" },
                { "type": "text", "text": "be kind" },
            ],
            "tools": [
                { "name": "ls", "input_schema": { "type": "object" } },
                { "name": "cat", "input_schema": { "type": "object" } },
            ],
            "messages": [
                { "role": "user", "content": [{ "type": "text", "text": "one" }] },
                { "role": "assistant", "content": [{ "type": "text", "text": "reply" }] },
                { "role": "user", "content": [{ "type": "text", "text": "two" }] },
            ],
        })
    }

    #[test]
    fn test_marks_tool_system_and_history() {
        let mut body = sample_body();
        inject_cache_breakpoints(&mut body);

        assert!(body["tools"][1].get("cache_control").is_some());
        assert!(body["tools"][0].get("cache_control").is_none());
        assert!(body["system"][1].get("cache_control").is_some());
        // Second-to-last user message gets the marker, the final one never.
        assert!(body["messages"][0]["content"][0]
            .get("cache_control")
            .is_some());
        assert!(body["messages"][2]["content"][0]
            .get("cache_control")
            .is_none());
    }

    #[test]
    fn test_idempotent() {
        let mut body = sample_body();
        inject_cache_breakpoints(&mut body);
        let after_first = body.clone();
        inject_cache_breakpoints(&mut body);
        assert_eq!(body, after_first);
    }

    #[test]
    fn test_noop_with_single_user_message() {
        let mut body = json!({
            "system": [{ "type": "text", "text": "s" }],
            "messages": [
                { "role": "user", "content": [{ "type": "text", "text": "hi" }] },
            ],
        });
        let before = body.clone();
        inject_cache_breakpoints(&mut body);
        assert_eq!(body, before);
    }

    #[test]
    fn test_skipped_when_marker_already_present() {
        let mut body = sample_body();
        body["messages"][2]["content"][0]["cache_control"] = json!({ "type": "ephemeral" });
        let before = body.clone();
        inject_cache_breakpoints(&mut body);
        assert_eq!(body, before);
    }
}
