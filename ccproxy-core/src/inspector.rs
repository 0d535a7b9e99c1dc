//! Request Inspector (§4.3): a pure function over an Anthropic request body
//! that picks a routing key, plus the two orthogonal direct-routing marker
//! detectors the Router composes it with.

use crate::types::RoutingKey;
use serde_json::Value;

const PLAN_MODE_MARKER: &str = "<system-reminder>\nPlan mode is active.";

/// What the inspector/router pipeline decided before alias lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionOutcome {
    /// A tool in `tools` declares `type` with no `input_schema`.
    BuiltinTools,
    /// `/model <alias>` found as the first non-empty line of the last system block.
    AgentDirect(String),
    /// The request's `model` field ends with `!`.
    Direct(String),
    /// Content-based classification; carries one of
    /// `background | planning | thinking | plan_and_think | default`.
    Content(RoutingKey),
}

/// Full precedence chain (§4.3's closing composition rule):
/// builtin_tools → agent_direct → direct → content-based key.
pub fn inspect(payload: &Value, model_field: &str) -> InspectionOutcome {
    if has_builtin_tools(payload) {
        return InspectionOutcome::BuiltinTools;
    }
    if let Some(alias) = detect_agent_direct(payload) {
        return InspectionOutcome::AgentDirect(alias);
    }
    if let Some(alias) = detect_direct(model_field) {
        return InspectionOutcome::Direct(alias);
    }
    InspectionOutcome::Content(classify_content(payload))
}

/// Step 1: any tool with a `type` field and no `input_schema` marks the
/// request as using a provider builtin tool (e.g. Anthropic's `web_search`).
fn has_builtin_tools(payload: &Value) -> bool {
    let Some(tools) = payload.get("tools").and_then(Value::as_array) else {
        return false;
    };
    tools.iter().any(|tool| {
        tool.is_object() && tool.get("type").is_some() && tool.get("input_schema").is_none()
    })
}

/// Steps 2-4: low-budget shortcut, then plan-mode/thinking detection, else default.
/// Never returns `BuiltinTools` — that precedence level is handled by the caller.
fn classify_content(payload: &Value) -> RoutingKey {
    if let Some(max_tokens) = payload.get("max_tokens").and_then(Value::as_u64) {
        if max_tokens < 768 {
            return RoutingKey::Background;
        }
    }

    let thinking_enabled = payload
        .get("thinking")
        .and_then(|t| t.get("budget_tokens"))
        .and_then(Value::as_u64)
        .map(|budget| budget > 0)
        .unwrap_or(false);

    let plan_mode = last_user_message_has_plan_marker(payload);

    match (plan_mode, thinking_enabled) {
        (true, true) => RoutingKey::PlanAndThink,
        (false, true) => RoutingKey::Thinking,
        (true, false) => RoutingKey::Planning,
        (false, false) => RoutingKey::Default,
    }
}

/// Scans the last `user` message's text/tool_result blocks (ignoring
/// `thinking` blocks) for the exact plan-mode literal.
fn last_user_message_has_plan_marker(payload: &Value) -> bool {
    let Some(messages) = payload.get("messages").and_then(Value::as_array) else {
        return false;
    };
    let Some(last_user) = messages.iter().rev().find(|m| m.get("role").and_then(Value::as_str) == Some("user")) else {
        return false;
    };

    match last_user.get("content") {
        Some(Value::String(text)) => text.contains(PLAN_MODE_MARKER),
        Some(Value::Array(blocks)) => blocks.iter().any(|block| {
            let block_type = block.get("type").and_then(Value::as_str);
            match block_type {
                Some("thinking") | Some("redacted_thinking") => false,
                Some("text") => block
                    .get("text")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.contains(PLAN_MODE_MARKER)),
                Some("tool_result") => tool_result_contains_marker(block),
                _ => false,
            }
        }),
        _ => false,
    }
}

fn tool_result_contains_marker(block: &Value) -> bool {
    match block.get("content") {
        Some(Value::String(text)) => text.contains(PLAN_MODE_MARKER),
        Some(Value::Array(items)) => items.iter().any(|item| {
            item.get("type").and_then(Value::as_str) == Some("text")
                && item.get("text").and_then(Value::as_str).is_some_and(|s| s.contains(PLAN_MODE_MARKER))
        }),
        _ => false,
    }
}

/// Last system text block, first non-empty trimmed line matches `^/model\s+(\S+)$`.
fn detect_agent_direct(payload: &Value) -> Option<String> {
    let system = payload.get("system")?;
    let last_text = match system {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => blocks
            .iter()
            .rev()
            .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }?;

    let first_line = last_text.lines().map(str::trim).find(|line| !line.is_empty())?;
    let rest = first_line.strip_prefix("/model")?;
    let alias = rest.trim();
    if alias.is_empty() || alias.contains(char::is_whitespace) {
        None
    } else {
        Some(alias.to_string())
    }
}

fn detect_direct(model_field: &str) -> Option<String> {
    model_field.strip_suffix('!').map(str::to_string)
}
