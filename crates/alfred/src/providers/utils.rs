use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{ToolCall, ToolDescriptor};

static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex"));
static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"));

/// Name sent for a tool request the model produced but we could not parse
pub const INVALID_TOOL_CALL_NAME: &str = "invalid_tool_call";

/// Convert internal Message format to OpenAI's API message specification
///
/// Tool responses whose request is not part of `messages` are skipped, which happens
/// when the memory window cuts between a request and its response.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();
    let mut open_calls = HashSet::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });
        let mut tool_calls = Vec::new();
        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        converted["content"] = json!(text.text);
                    }
                }
                MessageContent::ToolRequest(request) => {
                    let (name, arguments) = match &request.tool_call {
                        Ok(tool_call) => (
                            sanitize_function_name(&tool_call.name),
                            tool_call.arguments.to_string(),
                        ),
                        Err(_) => (INVALID_TOOL_CALL_NAME.to_string(), "{}".to_string()),
                    };
                    open_calls.insert(request.id.clone());
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": arguments,
                        }
                    }));
                }
                MessageContent::ToolResponse(response) => {
                    if !open_calls.remove(&response.id) {
                        tracing::debug!(id = %response.id, "dropping tool response without a request in context");
                        continue;
                    }
                    let content = match &response.tool_result {
                        Ok(text) => text.clone(),
                        // A tool error is shown as output so the model can interpret the error message
                        Err(e) => format!("The tool call returned the following error:\n{}", e),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if !tool_calls.is_empty() {
            converted["tool_calls"] = json!(tool_calls);
        }
        if message.role != Role::Tool
            && (converted.get("content").is_some() || converted.get("tool_calls").is_some())
        {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal tool descriptors to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[ToolDescriptor]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("Response did not contain a message: {}", response))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let call = if !is_valid_function_name(&function_name) {
                Err(AgentError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                )))
            } else {
                serde_json::from_str::<Value>(arguments)
                    .map(|params| ToolCall::new(&function_name, params))
                    .map_err(|e| {
                        AgentError::InvalidParameters(format!(
                            "Could not interpret tool use parameters for id {}: {}",
                            id, e
                        ))
                    })
            };
            message = message.with_tool_request(id, call);
        }
    }

    Ok(message)
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

/// The provider rejected our credentials. Retrying the turn cannot help.
#[derive(Debug, thiserror::Error)]
#[error("Authentication failed ({status}): {message}")]
pub struct AuthenticationError {
    pub status: u16,
    pub message: String,
}
