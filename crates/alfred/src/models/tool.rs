use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The description of a tool as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does, advisory to the model
    pub description: String,
    /// A JSON schema describing the arguments the tool accepts
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDescriptor {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Compact rendering used when a tool call has to stand in for an answer
    pub fn summary(&self) -> String {
        format!("[tool call] {}({})", self.name, self.arguments)
    }
}
