//! Per-turn trace events and the sinks that receive them.
//!
//! Sinks never influence a turn: delivery problems are logged and dropped.
pub mod langfuse;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::agent::TurnStatus;
use crate::providers::base::Usage;

pub use langfuse::{LangfuseConfig, LangfuseSink};

/// Identifies one turn across all of its events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub session_id: Option<String>,
}

impl TraceContext {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    TurnStarted {
        input: String,
    },
    ModelCall {
        step: usize,
        model: String,
        started_at: DateTime<Utc>,
        latency_ms: u64,
        usage: Usage,
        tool_requested: Option<String>,
        error: Option<String>,
    },
    ToolCall {
        step: usize,
        tool: String,
        arguments: serde_json::Value,
        output: String,
        is_error: bool,
        started_at: DateTime<Utc>,
        latency_ms: u64,
    },
    TurnFinished {
        output: String,
        status: TurnStatus,
        steps: usize,
        latency_ms: u64,
    },
    Feedback {
        score: u8,
        comment: Option<String>,
    },
}

impl TraceEvent {
    pub fn new(context: &TraceContext, kind: TraceEventKind) -> Self {
        Self {
            trace_id: context.trace_id.clone(),
            session_id: context.session_id.clone(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn record(&self, event: &TraceEvent);

    /// Deliver anything buffered
    async fn flush(&self) {}
}

/// Writes every event to the `tracing` log
pub struct LogSink;

#[async_trait]
impl TraceSink for LogSink {
    async fn record(&self, event: &TraceEvent) {
        match serde_json::to_string(&event.kind) {
            Ok(kind) => tracing::info!(trace_id = %event.trace_id, event = %kind, "trace"),
            Err(e) => tracing::warn!(error = %e, "could not serialize trace event"),
        }
    }
}

/// Fans events out to every configured sink
#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl Telemetry {
    pub fn new(sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        Self { sinks }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    pub async fn record(&self, context: &TraceContext, kind: TraceEventKind) {
        if self.sinks.is_empty() {
            return;
        }
        let event = TraceEvent::new(context, kind);
        for sink in &self.sinks {
            sink.record(&event).await;
        }
    }

    pub async fn flush(&self) {
        for sink in &self.sinks {
            sink.flush().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Keeps events in memory
    #[derive(Default)]
    pub struct MemorySink {
        pub events: Mutex<Vec<TraceEvent>>,
        pub flushes: Mutex<usize>,
    }

    impl MemorySink {
        pub fn kinds(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|event| {
                    serde_json::to_value(&event.kind).unwrap()["kind"]
                        .as_str()
                        .unwrap()
                        .to_string()
                })
                .collect()
        }
    }

    #[async_trait]
    impl TraceSink for MemorySink {
        async fn record(&self, event: &TraceEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        async fn flush(&self) {
            *self.flushes.lock().unwrap() += 1;
        }
    }

    #[tokio::test]
    async fn test_telemetry_fans_out() {
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        let telemetry = Telemetry::default()
            .with_sink(first.clone())
            .with_sink(second.clone());
        let context = TraceContext::new(Some("session".to_string()));

        telemetry
            .record(
                &context,
                TraceEventKind::TurnStarted {
                    input: "Who is Ada?".to_string(),
                },
            )
            .await;
        telemetry.flush().await;

        assert_eq!(first.kinds(), vec!["turn_started"]);
        assert_eq!(second.kinds(), vec!["turn_started"]);
        assert_eq!(*first.flushes.lock().unwrap(), 1);
        let event = first.events.lock().unwrap()[0].clone();
        assert_eq!(event.trace_id, context.trace_id);
        assert_eq!(event.session_id.as_deref(), Some("session"));
    }

    #[test]
    fn test_event_serialization_is_flat() {
        let context = TraceContext::new(None);
        let event = TraceEvent::new(
            &context,
            TraceEventKind::Feedback {
                score: 5,
                comment: None,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "feedback");
        assert_eq!(value["score"], 5);
        assert_eq!(value["trace_id"], context.trace_id.as_str());
    }
}
