//! Tools the agent can call. Every tool takes a single string argument and returns text.
pub mod guest_info;
pub mod hub_stats;
pub mod web_search;

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{ToolCall, ToolDescriptor};

pub use guest_info::GuestInfoTool;
pub use hub_stats::HubStatsTool;
pub use web_search::WebSearchTool;

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("static regex"));

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Name of the single required string argument
    fn parameter(&self) -> &str {
        "query"
    }

    fn parameter_description(&self) -> &str {
        "The search query"
    }

    async fn invoke(&self, query: &str) -> AgentResult<String>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            self.name(),
            self.description(),
            json!({
                "type": "object",
                "properties": {
                    self.parameter(): {
                        "type": "string",
                        "description": self.parameter_description()
                    }
                },
                "required": [self.parameter()]
            }),
        )
    }
}

/// The tools that ship with alfred
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinTool {
    GuestInfoRetriever,
    WebSearch,
    GetHubStats,
}

/// A tool name that is safe to advertise as a function name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolName(String);

impl ToolName {
    pub fn parse<S: Into<String>>(name: S) -> AgentResult<Self> {
        let name = name.into();
        if TOOL_NAME.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(AgentError::InvalidParameters(format!(
                "Tool name '{}' must match [a-zA-Z0-9_-]{{1,64}}",
                name
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the query from a tool call's arguments. A bare JSON string is accepted as the query.
pub fn extract_query(arguments: &Value, parameter: &str) -> AgentResult<String> {
    match arguments {
        Value::String(query) => Ok(query.clone()),
        Value::Object(map) => map
            .get(parameter)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AgentError::InvalidParameters(format!(
                    "Missing '{}' string argument in {}",
                    parameter, arguments
                ))
            }),
        other => Err(AgentError::InvalidParameters(format!(
            "Expected an object with a '{}' argument, got {}",
            parameter, other
        ))),
    }
}

/// Ordered set of tools, looked up by name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<(ToolName, Arc<dyn Tool>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> AgentResult<()> {
        let name = ToolName::parse(tool.name())?;
        if self.get(name.as_str()).is_some() {
            return Err(AgentError::InvalidParameters(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        self.tools.push((name, tool));
        Ok(())
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> AgentResult<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|(tool_name, _)| tool_name.as_str() == name)
            .map(|(_, tool)| tool)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(_, tool)| tool.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool with the query taken from the call's arguments
    pub async fn dispatch(&self, call: &ToolCall) -> AgentResult<String> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let query = extract_query(&call.arguments, tool.parameter())?;
        tracing::info!(tool = %call.name, query = %query, "invoking tool");
        tool.invoke(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Repeat the query"
        }

        async fn invoke(&self, query: &str) -> AgentResult<String> {
            Ok(format!("echo: {}", query))
        }
    }

    #[test]
    fn test_builtin_tool_names() {
        let names: Vec<String> = BuiltinTool::iter().map(|t| t.to_string()).collect();
        assert_eq!(
            names,
            vec!["guest_info_retriever", "web_search", "get_hub_stats"]
        );
        assert_eq!(
            BuiltinTool::from_str("get_hub_stats").unwrap(),
            BuiltinTool::GetHubStats
        );
        assert!(BuiltinTool::from_str("calculator").is_err());
    }

    #[test]
    fn test_tool_name_validation() {
        assert!(ToolName::parse("web_search").is_ok());
        assert!(ToolName::parse("web-search2").is_ok());
        assert!(ToolName::parse("web search").is_err());
        assert!(ToolName::parse("").is_err());
        assert!(ToolName::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn test_descriptor_schema() {
        let descriptor = EchoTool.descriptor();
        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.input_schema["required"], json!(["query"]));
        assert_eq!(
            descriptor.input_schema["properties"]["query"]["type"],
            "string"
        );
    }

    #[test]
    fn test_extract_query() {
        assert_eq!(
            extract_query(&json!({"query": "Ada"}), "query").unwrap(),
            "Ada"
        );
        assert_eq!(extract_query(&json!("Ada"), "query").unwrap(), "Ada");
        assert!(matches!(
            extract_query(&json!({"q": "Ada"}), "query"),
            Err(AgentError::InvalidParameters(_))
        ));
        assert!(matches!(
            extract_query(&json!(42), "query"),
            Err(AgentError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(registry.register(Arc::new(EchoTool)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch() {
        let registry = ToolRegistry::new().with_tool(Arc::new(EchoTool)).unwrap();

        let result = registry
            .dispatch(&ToolCall::new("echo", json!({"query": "hello"})))
            .await;
        assert_eq!(result.unwrap(), "echo: hello");

        let missing = registry
            .dispatch(&ToolCall::new("calculator", json!({"query": "1+1"})))
            .await;
        assert_eq!(
            missing,
            Err(AgentError::ToolNotFound("calculator".to_string()))
        );
    }
}
