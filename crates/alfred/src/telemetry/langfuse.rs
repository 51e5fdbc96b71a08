use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{TraceEvent, TraceEventKind, TraceSink};

pub const LANGFUSE_DEFAULT_HOST: &str = "https://us.cloud.langfuse.com";
const TRACE_NAME: &str = "alfred-turn";

#[derive(Debug, Clone)]
pub struct LangfuseConfig {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
}

/// Buffers trace events and sends them in one batch to the Langfuse ingestion API on flush
pub struct LangfuseSink {
    client: Client,
    config: LangfuseConfig,
    buffer: Mutex<Vec<Value>>,
}

impl LangfuseSink {
    pub fn new(config: LangfuseConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            config,
            buffer: Mutex::new(Vec::new()),
        })
    }

    async fn send(&self, batch: Vec<Value>) -> anyhow::Result<()> {
        let url = format!(
            "{}/api/public/ingestion",
            self.config.host.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.public_key, Some(&self.config.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Langfuse ingestion returned {}: {}", status, body);
        }
        Ok(())
    }
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn level(is_error: bool) -> &'static str {
    if is_error {
        "ERROR"
    } else {
        "DEFAULT"
    }
}

/// Map an event onto the Langfuse ingestion envelope
pub fn ingestion_event(event: &TraceEvent) -> Value {
    let timestamp = rfc3339(event.timestamp);
    let (kind, body) = match &event.kind {
        TraceEventKind::TurnStarted { input } => (
            "trace-create",
            json!({
                "id": event.trace_id,
                "name": TRACE_NAME,
                "sessionId": event.session_id,
                "input": input,
                "timestamp": timestamp,
            }),
        ),
        TraceEventKind::ModelCall {
            step,
            model,
            started_at,
            usage,
            tool_requested,
            error,
            ..
        } => (
            "generation-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": event.trace_id,
                "name": format!("step-{}-model", step),
                "model": model,
                "startTime": rfc3339(*started_at),
                "endTime": timestamp,
                "usage": {
                    "input": usage.input_tokens,
                    "output": usage.output_tokens,
                    "total": usage.total_tokens,
                },
                "output": { "tool_requested": tool_requested },
                "level": level(error.is_some()),
                "statusMessage": error,
            }),
        ),
        TraceEventKind::ToolCall {
            step,
            tool,
            arguments,
            output,
            is_error,
            started_at,
            ..
        } => (
            "span-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": event.trace_id,
                "name": format!("step-{}-tool-{}", step, tool),
                "startTime": rfc3339(*started_at),
                "endTime": timestamp,
                "input": arguments,
                "output": output,
                "level": level(*is_error),
            }),
        ),
        TraceEventKind::TurnFinished {
            output,
            status,
            steps,
            latency_ms,
        } => (
            "trace-create",
            json!({
                "id": event.trace_id,
                "output": output,
                "metadata": {
                    "status": status,
                    "steps": steps,
                    "latency_ms": latency_ms,
                },
            }),
        ),
        TraceEventKind::Feedback { score, comment } => (
            "score-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": event.trace_id,
                "name": "user-rating",
                "value": score,
                "dataType": "NUMERIC",
                "comment": comment
                    .clone()
                    .unwrap_or_else(|| format!("User rating: {}/5", score)),
            }),
        ),
    };

    json!({
        "id": Uuid::new_v4().to_string(),
        "timestamp": timestamp,
        "type": kind,
        "body": body,
    })
}

#[async_trait]
impl TraceSink for LangfuseSink {
    async fn record(&self, event: &TraceEvent) {
        self.buffer.lock().await.push(ingestion_event(event));
    }

    async fn flush(&self) {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.send(batch).await {
            Ok(()) => tracing::debug!(count, "sent events to Langfuse"),
            Err(e) => tracing::warn!(error = %e, count, "failed to send events to Langfuse"),
        }
    }
}
