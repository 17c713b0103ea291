//! Input rewriting specific to the Codex backend.

use serde_json::{json, Value};
use std::collections::HashSet;

use crate::types::Tool;

/// Marker opening the bridge message.
pub const BRIDGE_HEADER: &str = "# Tool availability";

/// Rules closing the bridge message.
pub const HOUSE_RULES: &str = "## Rules\n\n\
- Call only tools listed in this message, by their exact names.\n\
- Never emit `shell`, `apply_patch` or `update_plan` calls, even if earlier \
instructions describe them.\n\
- Pass arguments that match each tool's parameter schema.\n\
- If no listed tool fits the task, say so instead of inventing one.";

/// Developer message mapping the vendor prompt's tool vocabulary onto the
/// tools actually offered in this request.
pub fn bridge_message(tools: &[Tool]) -> Value {
    let mut text = format!(
        "{BRIDGE_HEADER}\n\nThe instructions above describe Codex CLI tools such as `shell` \
         and `apply_patch`. They do not exist in this session."
    );
    if tools.is_empty() {
        text.push_str(" No tools are available; answer directly.");
    } else {
        text.push_str(" Use only the following tools, with exactly these names:\n");
        for tool in tools {
            let summary = tool.description.lines().next().unwrap_or_default();
            text.push_str(&format!("\n- `{}`: {}", tool.name, summary));
        }
    }
    text.push_str("\n\n");
    text.push_str(HOUSE_RULES);

    json!({
        "type": "message",
        "role": "developer",
        "content": [{"type": "input_text", "text": text}],
    })
}

fn is_bridge(item: &Value) -> bool {
    item["role"] == "developer"
        && item["content"][0]["text"]
            .as_str()
            .is_some_and(|t| t.starts_with(BRIDGE_HEADER))
}

/// Put `bridge` first, removing any earlier copy.
pub fn insert_bridge(input: &mut Vec<Value>, bridge: Value) {
    input.retain(|item| !is_bridge(item));
    input.insert(0, bridge);
}

/// Make `input` valid for a stateless (`store: false`) request.
///
/// References to stored items are dropped and item ids removed. A tool
/// output whose call is no longer in the input is restated as assistant text.
pub fn filter_stale_items(input: Vec<Value>) -> Vec<Value> {
    let mut calls = HashSet::new();
    let mut out = Vec::with_capacity(input.len());

    for mut item in input {
        let kind = item["type"].as_str().unwrap_or_default().to_string();
        match kind.as_str() {
            "item_reference" => continue,
            "function_call" => {
                if let Some(call_id) = item["call_id"].as_str() {
                    calls.insert(call_id.to_string());
                }
            }
            "function_call_output" => {
                let call_id = item["call_id"].as_str().unwrap_or_default().to_string();
                if !calls.contains(&call_id) {
                    let output = item["output"].as_str().unwrap_or_default().to_string();
                    item = json!({
                        "type": "message",
                        "role": "assistant",
                        "content": format!("Earlier tool result ({call_id}): {output}"),
                    });
                }
            }
            _ => {}
        }
        if let Some(fields) = item.as_object_mut() {
            fields.remove("id");
        }
        out.push(item);
    }
    out
}
