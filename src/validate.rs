//! Structural checks run before anything is sent to a backend.
//!
//! Tool checks report every problem they find instead of stopping at the first one, so
//! a client fixing a bad tool list gets the whole picture in one round trip.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{GatewayError, Result, ToolError};
use crate::translate::canonical::{MessagesRequest, Tool};
use crate::translate::BackendKind;

const SCHEMA_TYPES: &[&str] = &["object", "array", "string", "number", "integer", "boolean", "null"];

/// Problems with a typed tool definition. Empty means valid.
pub fn validate_tool(tool: &Tool) -> Vec<String> {
    let mut errors = Vec::new();
    if tool.name.trim().is_empty() {
        errors.push("Tool name must be a non-empty string".to_string());
    }
    check_input_schema(Some(&tool.input_schema), &mut errors);
    errors
}

/// Problems with a raw JSON tool definition, for input that did not parse as a [`Tool`].
pub fn validate_tool_value(tool: &Value) -> Vec<String> {
    let Some(obj) = tool.as_object() else {
        return vec!["Tool must be an object".to_string()];
    };

    let mut errors = Vec::new();
    match obj.get("name") {
        None => errors.push("Tool must have a 'name' field".to_string()),
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        Some(_) => errors.push("Tool name must be a non-empty string".to_string()),
    }

    if obj.contains_key("input_schema") {
        check_input_schema(obj.get("input_schema"), &mut errors);
    } else {
        errors.push("Tool must have an 'input_schema' field".to_string());
    }

    if obj.get("description").is_some_and(|d| !d.is_string()) {
        errors.push("Tool description must be a string".to_string());
    }
    errors
}

fn check_input_schema(schema: Option<&Value>, errors: &mut Vec<String>) {
    let Some(schema) = schema.and_then(Value::as_object) else {
        errors.push("Tool input_schema must be an object".to_string());
        return;
    };
    if let Some(ty) = schema.get("type") {
        let known = ty.as_str().is_some_and(|t| SCHEMA_TYPES.contains(&t));
        if !known {
            errors.push(format!("Tool input_schema has unsupported type {ty}"));
        }
    }
}

/// Problems across a whole tool list, each prefixed with the tool's position and name.
/// Duplicate names are reported too.
pub fn validate_tools(tools: &[Tool]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, tool) in tools.iter().enumerate() {
        for problem in validate_tool(tool) {
            errors.push(format!("tools[{index}] '{}': {problem}", tool.name));
        }
        if !tool.name.is_empty() && !seen.insert(tool.name.as_str()) {
            errors.push(format!("tools[{index}] '{}': duplicate tool name", tool.name));
        }
    }
    errors
}

/// Reject a request whose tool list has any problem.
pub fn check_tools(req: &MessagesRequest) -> Result<()> {
    let Some(tools) = req.tools.as_deref() else {
        return Ok(());
    };
    let errors = validate_tools(tools);
    if errors.is_empty() {
        return Ok(());
    }

    let tool_name = tools
        .iter()
        .find(|t| !validate_tool(t).is_empty())
        .map_or("tools", |t| t.name.as_str());
    Err(ToolError::validation(tool_name, errors).into())
}

/// Tool problems in a raw request body that did not parse as a typed request.
///
/// Every tool is checked so the client sees all problems at once instead of the
/// first deserialization error.
pub fn check_raw_tools(body: &Value) -> Result<()> {
    let Some(tools) = body.get("tools") else {
        return Ok(());
    };
    let Some(tools) = tools.as_array() else {
        return Err(ToolError::validation("tools", vec!["tools must be an array".to_string()]).into());
    };

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut first_bad = None;
    for (index, tool) in tools.iter().enumerate() {
        let name = tool.get("name").and_then(Value::as_str).unwrap_or_default();
        let problems = validate_tool_value(tool);
        if !problems.is_empty() && first_bad.is_none() {
            first_bad = Some(name);
        }
        for problem in problems {
            errors.push(format!("tools[{index}] '{name}': {problem}"));
        }
        if !name.is_empty() && !seen.insert(name) {
            errors.push(format!("tools[{index}] '{name}': duplicate tool name"));
        }
    }
    if errors.is_empty() {
        return Ok(());
    }

    let tool_name = first_bad.filter(|n| !n.is_empty()).unwrap_or("tools");
    Err(ToolError::validation(tool_name, errors).into())
}

/// Accepted temperature range per backend. The router is limited by its narrowest provider.
pub fn temperature_range(kind: BackendKind) -> (f64, f64) {
    match kind {
        BackendKind::Responses | BackendKind::Chat => (0.0, 2.0),
        BackendKind::Router => (0.0, 1.0),
    }
}

/// Backend-independent request checks.
pub fn validate_request(req: &MessagesRequest) -> Result<()> {
    if req.model.trim().is_empty() {
        return Err(GatewayError::invalid_request("model must not be empty"));
    }
    if req.messages.is_empty() {
        return Err(GatewayError::invalid_request("messages must not be empty"));
    }
    if req.max_tokens == 0 {
        return Err(GatewayError::invalid_request("max_tokens must be greater than 0"));
    }
    Ok(())
}

/// Temperature check against the selected backend.
pub fn validate_temperature(req: &MessagesRequest, kind: BackendKind) -> Result<()> {
    let Some(temperature) = req.temperature else {
        return Ok(());
    };
    let (low, high) = temperature_range(kind);
    if !(low..=high).contains(&temperature) {
        return Err(GatewayError::invalid_request(format!(
            "temperature {temperature} is outside {low}..={high} for the {kind} backend"
        )));
    }
    Ok(())
}
