use super::role::Role;
use super::tool::ToolCall;
use crate::errors::AgentResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: AgentResult<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub tool_result: AgentResult<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Content passed inside a message, which can be both simple text and tool content
pub enum MessageContent {
    Text(TextContent),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn tool_request<S: Into<String>>(id: S, tool_call: AgentResult<ToolCall>) -> Self {
        MessageContent::ToolRequest(ToolRequest {
            id: id.into(),
            tool_call,
        })
    }

    pub fn tool_response<S: Into<String>>(id: S, tool_result: AgentResult<String>) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            id: id.into(),
            tool_result,
        })
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        if let MessageContent::ToolRequest(ref tool_request) = self {
            Some(tool_request)
        } else {
            None
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponse> {
        if let MessageContent::ToolResponse(ref tool_response) = self {
            Some(tool_response)
        } else {
            None
        }
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::with_role(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::with_role(Role::Assistant)
    }

    /// Create a new tool message with the current timestamp
    pub fn tool() -> Self {
        Self::with_role(Role::Tool)
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    /// Add a tool request to the message
    pub fn with_tool_request<S: Into<String>>(
        self,
        id: S,
        tool_call: AgentResult<ToolCall>,
    ) -> Self {
        self.with_content(MessageContent::tool_request(id, tool_call))
    }

    /// Add a tool response to the message
    pub fn with_tool_response<S: Into<String>>(self, id: S, result: AgentResult<String>) -> Self {
        self.with_content(MessageContent::tool_response(id, result))
    }

    /// All text content joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(MessageContent::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_requests(&self) -> impl Iterator<Item = &ToolRequest> {
        self.content.iter().filter_map(MessageContent::as_tool_request)
    }

    pub fn has_tool_request(&self) -> bool {
        self.tool_requests().next().is_some()
    }

    /// Keep every text item but only the first tool request
    pub fn retain_first_tool_request(mut self) -> Self {
        let mut seen = false;
        self.content.retain(|content| match content {
            MessageContent::ToolRequest(_) if seen => false,
            MessageContent::ToolRequest(_) => {
                seen = true;
                true
            }
            _ => true,
        });
        self
    }

    /// The best available answer text for this message.
    ///
    /// Plain text wins; otherwise a pending tool request is rendered as
    /// `[tool call] name(arguments)`.
    pub fn summary(&self) -> String {
        let text = self.text();
        if !text.trim().is_empty() {
            return text;
        }
        match self.tool_requests().next().map(|r| &r.tool_call) {
            Some(Ok(call)) => call.summary(),
            Some(Err(e)) => format!("[tool call] {}", e),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use serde_json::json;

    #[test]
    fn test_text_joins_items() {
        let message = Message::assistant().with_text("Hello").with_text("World");
        assert_eq!(message.text(), "Hello\nWorld");
    }

    #[test]
    fn test_retain_first_tool_request() {
        let message = Message::assistant()
            .with_text("Looking that up")
            .with_tool_request("1", Ok(ToolCall::new("web_search", json!({"query": "a"}))))
            .with_tool_request("2", Ok(ToolCall::new("web_search", json!({"query": "b"}))))
            .retain_first_tool_request();

        assert_eq!(message.content.len(), 2);
        let ids: Vec<_> = message.tool_requests().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_summary_prefers_text() {
        let message = Message::assistant()
            .with_text("Tesla is here")
            .with_tool_request("1", Ok(ToolCall::new("web_search", json!({"query": "a"}))));
        assert_eq!(message.summary(), "Tesla is here");
    }

    #[test]
    fn test_summary_renders_tool_call_stub() {
        let message = Message::assistant().with_tool_request(
            "1",
            Ok(ToolCall::new("guest_info_retriever", json!({"query": "Ada"}))),
        );
        assert_eq!(
            message.summary(),
            r#"[tool call] guest_info_retriever({"query":"Ada"})"#
        );
    }

    #[test]
    fn test_message_serialization_keeps_errors() {
        let message = Message::tool().with_tool_response(
            "1",
            Err(AgentError::ToolNotFound("nope".to_string())),
        );
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
        assert!(json.contains(r#""role":"tool""#));
    }
}
