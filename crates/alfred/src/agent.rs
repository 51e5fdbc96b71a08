use std::time::Instant;

use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::prompt_template::render_system_prompt;
use crate::providers::base::Provider;
use crate::providers::utils::{AuthenticationError, INVALID_TOOL_CALL_NAME};
use crate::session::Session;
use crate::telemetry::{Telemetry, TraceContext, TraceEventKind};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_STEPS: usize = 10;
pub const DEFAULT_MEMORY_WINDOW: usize = 50;

/// Prefix of the assistant message recorded when a model call fails
pub const PROVIDER_FAILURE_PREFIX: &str = "I ran into a problem contacting the language model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    max_steps: usize,
    memory_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            memory_window: DEFAULT_MEMORY_WINDOW,
        }
    }
}

impl AgentConfig {
    pub fn new(max_steps: usize, memory_window: usize) -> AgentResult<Self> {
        if max_steps == 0 {
            return Err(AgentError::InvalidParameters(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if memory_window == 0 {
            return Err(AgentError::InvalidParameters(
                "memory_window must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_steps,
            memory_window,
        })
    }

    /// Upper bound on model calls in one turn
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Number of most recent messages sent to the model
    pub fn memory_window(&self) -> usize {
        self.memory_window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    StepLimitReached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A message appended to the conversation
    Message(Message),
    /// Always the last event of a turn that did not fail
    Finished {
        status: TurnStatus,
        steps: usize,
        answer: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub trace_id: String,
    /// Assistant and tool messages produced during the turn, in order
    pub messages: Vec<Message>,
    pub answer: String,
    pub status: TurnStatus,
    pub steps: usize,
}

/// The most recent `window` messages, oldest dropped first
pub fn context_window(history: &[Message], window: usize) -> &[Message] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Agent combines a language model with the tools it may call
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: ToolRegistry,
    config: AgentConfig,
    system_prompt: String,
    telemetry: Telemetry,
}

impl Agent {
    pub fn new(
        provider: Box<dyn Provider>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> AgentResult<Self> {
        let system_prompt = render_system_prompt(&tools.descriptors(), None)
            .map_err(|e| AgentError::Internal(format!("Failed to render system prompt: {}", e)))?;
        Ok(Self {
            provider,
            tools,
            config,
            system_prompt,
            telemetry: Telemetry::default(),
        })
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one turn over `history`, which should end with the new user message.
    ///
    /// Every appended message is yielded as it is produced, followed by a single
    /// [`AgentEvent::Finished`]. Only an authentication failure ends the stream with an error.
    pub fn reply(
        &self,
        history: &[Message],
        trace: TraceContext,
    ) -> BoxStream<'_, AgentResult<AgentEvent>> {
        let mut messages = history.to_vec();
        let tools = self.tools.descriptors();
        let input = history
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(Message::text)
            .unwrap_or_default();

        Box::pin(async_stream::try_stream! {
            let turn_timer = Instant::now();
            self.telemetry.record(&trace, TraceEventKind::TurnStarted { input }).await;

            let mut steps = 0;
            let mut status = TurnStatus::StepLimitReached;
            let mut answer = String::new();

            while steps < self.config.max_steps() {
                steps += 1;

                let window = context_window(&messages, self.config.memory_window());
                let started_at = Utc::now();
                let timer = Instant::now();
                let result = self.provider.complete(&self.system_prompt, window, &tools).await;
                let latency_ms = elapsed_ms(timer);

                let response = match result {
                    Ok((response, usage)) => {
                        let tool_requested = response.tool_requests().next().map(|request| {
                            match &request.tool_call {
                                Ok(call) => call.name.clone(),
                                Err(e) => e.to_string(),
                            }
                        });
                        self.telemetry.record(&trace, TraceEventKind::ModelCall {
                            step: steps,
                            model: self.provider.model().to_string(),
                            started_at,
                            latency_ms,
                            usage,
                            tool_requested,
                            error: None,
                        }).await;
                        response
                    }
                    Err(error) => {
                        self.telemetry.record(&trace, TraceEventKind::ModelCall {
                            step: steps,
                            model: self.provider.model().to_string(),
                            started_at,
                            latency_ms,
                            usage: Default::default(),
                            tool_requested: None,
                            error: Some(error.to_string()),
                        }).await;

                        if let Some(auth) = error.downcast_ref::<AuthenticationError>() {
                            tracing::error!(step = steps, error = %auth, "language model rejected credentials");
                            self.telemetry.flush().await;
                            Err::<(), _>(AgentError::Unauthorized(auth.to_string()))?;
                        }

                        tracing::warn!(step = steps, error = %error, "language model call failed");
                        let message = Message::assistant()
                            .with_text(format!("{}: {}", PROVIDER_FAILURE_PREFIX, error));
                        answer = message.summary();
                        messages.push(message.clone());
                        yield AgentEvent::Message(message);
                        continue;
                    }
                };

                let request = response.tool_requests().next().cloned();
                let request = match request {
                    Some(request) => request,
                    None => {
                        answer = response.summary();
                        messages.push(response.clone());
                        yield AgentEvent::Message(response);
                        status = TurnStatus::Completed;
                        break;
                    }
                };

                let dropped = response.tool_requests().count() - 1;
                if dropped > 0 {
                    tracing::warn!(step = steps, dropped, "model requested several tool calls, only the first one runs");
                }
                let response = response.retain_first_tool_request();
                answer = response.summary();
                messages.push(response.clone());
                yield AgentEvent::Message(response);

                let started_at = Utc::now();
                let timer = Instant::now();
                let (tool, arguments, result) = match &request.tool_call {
                    Ok(call) => (
                        call.name.clone(),
                        call.arguments.clone(),
                        self.tools.dispatch(call).await,
                    ),
                    Err(e) => (INVALID_TOOL_CALL_NAME.to_string(), Value::Null, Err(e.clone())),
                };
                if let Err(e) = &result {
                    tracing::warn!(step = steps, tool = %tool, error = %e, "tool call failed");
                }
                self.telemetry.record(&trace, TraceEventKind::ToolCall {
                    step: steps,
                    tool,
                    arguments,
                    output: match &result {
                        Ok(output) => output.clone(),
                        Err(e) => e.to_string(),
                    },
                    is_error: result.is_err(),
                    started_at,
                    latency_ms: elapsed_ms(timer),
                }).await;

                let tool_message = Message::tool().with_tool_response(request.id, result);
                messages.push(tool_message.clone());
                yield AgentEvent::Message(tool_message);
            }

            tracing::info!(trace_id = %trace.trace_id, steps, ?status, "turn finished");
            self.telemetry.record(&trace, TraceEventKind::TurnFinished {
                output: answer.clone(),
                status,
                steps,
                latency_ms: elapsed_ms(turn_timer),
            }).await;
            self.telemetry.flush().await;

            yield AgentEvent::Finished { status, steps, answer };
        })
    }

    /// Run one turn to completion and collect what it produced
    pub async fn run(&self, history: &[Message], trace: TraceContext) -> AgentResult<TurnOutcome> {
        let trace_id = trace.trace_id.clone();
        let mut stream = self.reply(history, trace);
        let mut messages = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                AgentEvent::Message(message) => messages.push(message),
                AgentEvent::Finished {
                    status,
                    steps,
                    answer,
                } => {
                    return Ok(TurnOutcome {
                        trace_id,
                        messages,
                        answer,
                        status,
                        steps,
                    })
                }
            }
        }

        Err(AgentError::Internal(
            "reply stream ended before the turn finished".to_string(),
        ))
    }

    /// Append `text` as a user message, run a turn, and append its messages to the session.
    /// A failed turn leaves the session as it was.
    pub async fn respond(&self, session: &mut Session, text: &str) -> AgentResult<TurnOutcome> {
        let checkpoint = session.len();
        session.push(Message::user().with_text(text));

        let trace = TraceContext::new(Some(session.id.clone()));
        match self.run(&session.messages, trace).await {
            Ok(outcome) => {
                session.extend(outcome.messages.iter().cloned());
                Ok(outcome)
            }
            Err(e) => {
                session.truncate(checkpoint);
                Err(e)
            }
        }
    }

    /// Attach a 1-5 rating to a finished turn
    pub async fn record_feedback(
        &self,
        trace: &TraceContext,
        score: u8,
        comment: Option<String>,
    ) -> AgentResult<()> {
        if !(1..=5).contains(&score) {
            return Err(AgentError::InvalidParameters(format!(
                "Rating must be between 1 and 5, got {}",
                score
            )));
        }
        self.telemetry
            .record(trace, TraceEventKind::Feedback { score, comment })
            .await;
        self.telemetry.flush().await;
        Ok(())
    }
}
