pub mod session_file;

use std::path::PathBuf;

use anyhow::Result;
use futures::StreamExt;

use alfred::agent::{Agent, AgentEvent, TurnStatus};
use alfred::errors::AgentError;
use alfred::models::message::Message;
use alfred::session::Session as History;
use alfred::telemetry::TraceContext;

use crate::prompt::{InputType, Prompt};
use session_file::persist_messages;

/// How a turn driven from the prompt came to an end
#[derive(Debug, PartialEq)]
enum TurnEnd {
    Finished { status: TurnStatus, steps: usize },
    Interrupted,
}

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    session_file: PathBuf,
    history: History,
    last_trace: Option<TraceContext>,
}

impl<'a> Session<'a> {
    pub fn new(
        agent: Agent,
        prompt: Box<dyn Prompt + 'a>,
        session_file: PathBuf,
        history: History,
    ) -> Self {
        Session {
            agent,
            prompt,
            session_file,
            history,
            last_trace: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.setup_session();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        // Credential problems are reported and the session stays open
                        if let Err(e) = self.process_turn(content).await {
                            self.prompt.render(&raw_message(&format!("Error: {}\n", e)));
                        }
                    }
                }
                InputType::Rate(score) => self.rate(score, input.content).await,
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }

        self.close_session();
        Ok(())
    }

    /// Answer a single message and return, failing if the turn could not run
    pub async fn headless_start(&mut self, text: String) -> Result<()> {
        self.process_turn(text).await?;
        self.prompt.close();
        Ok(())
    }

    async fn process_turn(&mut self, text: String) -> Result<()> {
        let checkpoint = self.history.len();
        self.history.push(Message::user().with_text(text));
        persist_messages(&self.session_file, &self.history.messages)?;

        let trace = TraceContext::new(Some(self.history.id.clone()));
        self.prompt.show_busy();
        let result = self.agent_process_messages(trace.clone()).await;
        self.prompt.hide_busy();

        match result {
            Ok(TurnEnd::Finished { status, steps }) => {
                self.last_trace = Some(trace);
                if status == TurnStatus::StepLimitReached {
                    self.prompt.render(&raw_message(&format!(
                        "(Alfred stopped after {} steps without a final answer. The last step is shown above.)\n",
                        steps
                    )));
                }
            }
            Ok(TurnEnd::Interrupted) => {
                self.history.truncate(checkpoint);
                self.prompt.render(&raw_message(
                    " Interrupt: Resetting conversation to before the last sent message...\n",
                ));
            }
            Err(e) => {
                self.history.truncate(checkpoint);
                persist_messages(&self.session_file, &self.history.messages)?;
                return Err(match &e {
                    AgentError::Unauthorized(_) => anyhow::anyhow!(
                        "{}. Check OPENAI_API_KEY or provider.api_key in alfred.toml",
                        e
                    ),
                    _ => e.into(),
                });
            }
        }

        persist_messages(&self.session_file, &self.history.messages)?;
        Ok(())
    }

    async fn agent_process_messages(
        &mut self,
        trace: TraceContext,
    ) -> Result<TurnEnd, AgentError> {
        let mut stream = self.agent.reply(&self.history.messages, trace);
        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(Ok(AgentEvent::Message(message))) => {
                            self.history.push(message.clone());
                            persist_messages(&self.session_file, &self.history.messages)
                                .unwrap_or_else(|e| eprintln!("Failed to persist messages: {}", e));
                            self.prompt.hide_busy();
                            self.prompt.render(&message);
                            self.prompt.show_busy();
                        }
                        Some(Ok(AgentEvent::Finished { status, steps, .. })) => {
                            return Ok(TurnEnd::Finished { status, steps });
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            return Err(AgentError::Internal(
                                "reply stream ended before the turn finished".to_string(),
                            ))
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    drop(stream);
                    return Ok(TurnEnd::Interrupted);
                }
            }
        }
    }

    async fn rate(&mut self, score: u8, comment: Option<String>) {
        let Some(trace) = &self.last_trace else {
            self.prompt
                .render(&raw_message("There is no answer to rate yet.\n"));
            return;
        };

        let reply = match self.agent.record_feedback(trace, score, comment).await {
            Ok(()) => format!("Thank you. Recorded a rating of {}/5.\n", score),
            Err(e) => format!("Could not record the rating: {}\n", e),
        };
        self.prompt.render(&raw_message(&reply));
    }

    fn setup_session(&mut self) {
        let verb = if self.history.is_empty() {
            "Starting"
        } else {
            "Resuming"
        };
        self.prompt.render(&raw_message(&format!(
            "{} session. Recording to {}\n",
            verb,
            self.session_file.display()
        )));
        self.prompt.render(&raw_message(&format!(
            "Tools: {}\n",
            self.agent.tools().names().join(", ")
        )));
        self.prompt.alfred_ready();
    }

    fn close_session(&mut self) {
        self.prompt.render(&raw_message(&format!(
            "Closing session. Recorded to {}\n",
            self.session_file.display()
        )));
        self.prompt.close();
    }
}

fn raw_message(content: &str) -> Message {
    Message::assistant().with_text(content)
}
