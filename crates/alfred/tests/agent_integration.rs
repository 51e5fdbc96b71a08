use std::sync::{Arc, Mutex};

use alfred::agent::{Agent, AgentConfig, TurnStatus};
use alfred::guests::GuestStore;
use alfred::models::message::{Message, MessageContent};
use alfred::models::role::Role;
use alfred::models::tool::{ToolCall, ToolDescriptor};
use alfred::providers::base::{Provider, Usage};
use alfred::retriever::embedding::HashingEmbedder;
use alfred::retriever::{HybridRetriever, RetrieverConfig};
use alfred::session::Session;
use alfred::tools::{GuestInfoTool, ToolRegistry};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

/// Replays canned responses and remembers what it was shown
struct ScriptedProvider {
    responses: Mutex<Vec<Message>>,
    seen: Arc<Mutex<Vec<(Vec<Message>, Vec<ToolDescriptor>)>>>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        _system: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<(Message, Usage)> {
        self.seen
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        let mut responses = self.responses.lock().unwrap();
        let next = if responses.is_empty() {
            Message::assistant().with_text("")
        } else {
            responses.remove(0)
        };
        Ok((next, Usage::default()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

async fn guest_agent(
    responses: Vec<Message>,
    config: AgentConfig,
) -> Result<(Agent, Arc<Mutex<Vec<(Vec<Message>, Vec<ToolDescriptor>)>>>)> {
    let retriever = HybridRetriever::build(
        GuestStore::bundled()?,
        Arc::new(HashingEmbedder::default()),
        RetrieverConfig::default(),
    )
    .await?;
    let registry = ToolRegistry::new().with_tool(Arc::new(GuestInfoTool::new(Arc::new(retriever))))?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let provider = ScriptedProvider {
        responses: Mutex::new(responses),
        seen: seen.clone(),
    };
    Ok((Agent::new(Box::new(provider), registry, config)?, seen))
}

#[tokio::test]
async fn test_guest_lookup_round_trip() -> Result<()> {
    let (agent, seen) = guest_agent(
        vec![
            Message::assistant().with_tool_request(
                "call_1",
                Ok(ToolCall::new(
                    "guest_info_retriever",
                    json!({"query": "Nikola Tesla"}),
                )),
            ),
            Message::assistant().with_text("Dr. Tesla loves pigeons; ask him about wireless energy."),
        ],
        AgentConfig::default(),
    )
    .await?;
    let mut session = Session::new();

    let outcome = agent
        .respond(&mut session, "Tell me about our guest named Nikola Tesla.")
        .await?;

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.steps, 2);
    assert_eq!(session.len(), 4);
    assert_eq!(session.messages[2].role, Role::Tool);
    match &session.messages[2].content[0] {
        MessageContent::ToolResponse(response) => {
            let text = response.tool_result.as_ref().unwrap();
            assert!(text.starts_with("Name: Dr. Nikola Tesla"));
        }
        other => panic!("expected a tool response, got {:?}", other),
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1.len(), 1);
    assert_eq!(seen[0].1[0].name, "guest_info_retriever");
    Ok(())
}

#[tokio::test]
async fn test_memory_window_across_turns() -> Result<()> {
    let replies = (0..30)
        .map(|i| Message::assistant().with_text(format!("reply {}", i)))
        .collect();
    let (agent, seen) = guest_agent(replies, AgentConfig::new(3, 50)?).await?;
    let mut session = Session::new();

    for i in 0..30 {
        agent.respond(&mut session, &format!("question {}", i)).await?;
    }

    let seen = seen.lock().unwrap();
    assert_eq!(session.len(), 60);
    let last_context = &seen.last().unwrap().0;
    assert_eq!(last_context.len(), 50);
    assert_eq!(last_context.as_slice(), &session.messages[9..59]);
    Ok(())
}

#[tokio::test]
async fn test_step_limit_keeps_history_well_formed() -> Result<()> {
    let (agent, _) = guest_agent(
        vec![Message::assistant().with_tool_request(
            "call_1",
            Ok(ToolCall::new("guest_info_retriever", json!({"query": "Ada"}))),
        )],
        AgentConfig::new(1, 50)?,
    )
    .await?;
    let mut session = Session::new();

    let outcome = agent.respond(&mut session, "Who is Ada?").await?;

    assert_eq!(outcome.status, TurnStatus::StepLimitReached);
    assert!(outcome.answer.starts_with("[tool call] guest_info_retriever("));
    // the request still gets its result
    assert_eq!(session.messages.last().unwrap().role, Role::Tool);
    Ok(())
}
