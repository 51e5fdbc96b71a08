use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::ToolDescriptor;
use crate::providers::base::{Provider, Usage};
use crate::providers::utils::AuthenticationError;

/// A scripted response for the mock provider
pub enum MockResponse {
    Message(Message),
    Failure(String),
    Unauthorized,
}

impl From<Message> for MockResponse {
    fn from(message: Message) -> Self {
        MockResponse::Message(message)
    }
}

/// A mock provider that returns pre-configured responses and records every context it was sent
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    contexts: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::scripted(responses.into_iter().map(MockResponse::from).collect())
    }

    pub fn scripted(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The message lists passed to each completion call, in order
    pub fn contexts(&self) -> Vec<Vec<Message>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<(Message, Usage)> {
        self.contexts.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            return Ok((Message::assistant().with_text(""), Usage::default()));
        }
        match responses.remove(0) {
            MockResponse::Message(message) => Ok((message, Usage::new(Some(1), Some(1), Some(2)))),
            MockResponse::Failure(reason) => Err(anyhow!(reason)),
            MockResponse::Unauthorized => Err(AuthenticationError {
                status: 401,
                message: "invalid api key".to_string(),
            }
            .into()),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }
}
