use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

use alfred::agent::{AgentEvent, TurnStatus};
use alfred::models::message::{Message, MessageContent};
use alfred::providers::utils::INVALID_TOOL_CALL_NAME;
use alfred::telemetry::TraceContext;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    message: String,
}

// Custom SSE response type that implements the Vercel AI SDK protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        (
            [
                ("content-type", "text/event-stream"),
                ("cache-control", "no-cache"),
                ("connection", "keep-alive"),
                ("x-vercel-ai-data-stream", "v1"),
            ],
            body,
        )
            .into_response()
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_tool_call(id: &str, name: &str, args: &Value) -> String {
        // Tool calls start with "9:"
        let tool_call = json!({
            "toolCallId": id,
            "toolName": name,
            "args": args
        });
        format!("9:{}\n", tool_call)
    }

    fn format_tool_response(id: &str, result: &str) -> String {
        // Tool responses start with "a:"
        let response = json!({
            "toolCallId": id,
            "result": result,
        });
        format!("a:{}\n", response)
    }

    fn format_error(error: &str) -> String {
        let encoded = serde_json::to_string(error).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded)
    }

    fn format_finish(reason: &str, steps: usize) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            },
            "steps": steps
        });
        format!("d:{}\n", finish)
    }
}

fn finish_reason(status: TurnStatus) -> &'static str {
    match status {
        TurnStatus::Completed => "stop",
        TurnStatus::StepLimitReached => "length",
    }
}

/// Frames for one message appended during a turn
fn protocol_frames(message: &Message) -> Vec<String> {
    let mut frames = Vec::new();
    for content in &message.content {
        match content {
            MessageContent::Text(text) => {
                // Each frame keeps its own line break
                for line in text.text.split_inclusive('\n') {
                    frames.push(ProtocolFormatter::format_text(line));
                }
            }
            MessageContent::ToolRequest(request) => match &request.tool_call {
                Ok(call) => frames.push(ProtocolFormatter::format_tool_call(
                    &request.id,
                    &call.name,
                    &call.arguments,
                )),
                // A malformed request still pairs with the error response that follows it
                Err(_) => frames.push(ProtocolFormatter::format_tool_call(
                    &request.id,
                    INVALID_TOOL_CALL_NAME,
                    &json!({}),
                )),
            },
            MessageContent::ToolResponse(response) => {
                let result = match &response.tool_result {
                    Ok(output) => output.clone(),
                    Err(e) => format!("Error: {}", e),
                };
                frames.push(ProtocolFormatter::format_tool_response(
                    &response.id,
                    &result,
                ));
            }
        }
    }
    frames
}

async fn send_frames(
    message: &Message,
    tx: &mpsc::Sender<String>,
) -> Result<(), mpsc::error::SendError<String>> {
    for frame in protocol_frames(message) {
        tx.send(frame).await?;
    }
    Ok(())
}

async fn handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReplyRequest>,
) -> Result<SseResponse, ApiError> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(ApiError::BadRequest(
                "Only the data stream protocol is supported".to_string(),
            ));
        }
    }
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let entry = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);
    let agent = state.agent.clone();

    // Spawn task to handle streaming
    tokio::spawn(async move {
        // Turns within one session run one after another
        let mut entry = entry.lock_owned().await;
        let checkpoint = entry.session.len();
        entry
            .session
            .push(Message::user().with_text(request.message));

        let trace = TraceContext::new(Some(id.clone()));
        let mut stream = agent.reply(&entry.session.messages, trace.clone());

        let mut finished = None;
        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(Ok(AgentEvent::Message(message)))) => {
                    entry.session.push(message.clone());
                    if let Err(e) = send_frames(&message, &tx).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(Some(Ok(AgentEvent::Finished { status, steps, .. }))) => {
                    finished = Some((status, steps));
                    break;
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(session_id = %id, error = %e, "turn failed");
                    let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and then end the turn.
                    if tx.is_closed() {
                        tracing::info!(session_id = %id, "client disconnected mid-turn");
                        break;
                    }
                }
            }
        }
        drop(stream);

        match finished {
            Some((status, steps)) => {
                entry.last_trace = Some(trace);
                let _ = tx
                    .send(ProtocolFormatter::format_finish(
                        finish_reason(status),
                        steps,
                    ))
                    .await;
            }
            None => {
                // An unfinished turn leaves no trace in the history
                entry.session.truncate(checkpoint);
                let _ = tx.send(ProtocolFormatter::format_finish("error", 0)).await;
            }
        }
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/:id/reply", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{test_state, Canned};
    use alfred::errors::AgentError;
    use alfred::models::role::Role;
    use alfred::models::tool::ToolCall;
    use axum::{body::Body, http::Request, http::StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn reply_request(id: &str, message: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/sessions/{}/reply", id))
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": message }).to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn tesla_lookup() -> Message {
        Message::assistant().with_tool_request(
            "call_1",
            Ok(ToolCall::new(
                "guest_info_retriever",
                json!({ "query": "Nikola Tesla" }),
            )),
        )
    }

    #[test]
    fn test_format_text_escapes_json() {
        assert_eq!(
            ProtocolFormatter::format_text("He said \"hi\"\n"),
            "0:\"He said \\\"hi\\\"\\n\"\n"
        );
    }

    fn streamed_text(frames: &[String]) -> String {
        frames
            .iter()
            .map(|frame| {
                let payload = frame.strip_prefix("0:").unwrap().trim_end_matches('\n');
                serde_json::from_str::<String>(payload).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_text_frames_match_stored_text() {
        let single = protocol_frames(&Message::assistant().with_text("Good evening."));
        assert_eq!(single, vec!["0:\"Good evening.\"\n".to_string()]);

        let text = "Dr. Tesla is here.\nHe likes pigeons.";
        let frames = protocol_frames(&Message::assistant().with_text(text));
        assert_eq!(frames.len(), 2);
        assert_eq!(streamed_text(&frames), text);

        let text = "Two lines\nending in a break\n";
        assert_eq!(
            streamed_text(&protocol_frames(&Message::assistant().with_text(text))),
            text
        );
    }

    #[test]
    fn test_frames_for_tool_round_trip() {
        let frames = protocol_frames(&tesla_lookup());
        assert_eq!(frames.len(), 1);
        let call: Value = serde_json::from_str(frames[0].strip_prefix("9:").unwrap()).unwrap();
        assert_eq!(
            call,
            json!({
                "toolCallId": "call_1",
                "toolName": "guest_info_retriever",
                "args": { "query": "Nikola Tesla" }
            })
        );

        let failed = Message::tool().with_tool_response(
            "call_2",
            Err(AgentError::ToolNotFound("party_planner".to_string())),
        );
        let frames = protocol_frames(&failed);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("a:"));
        assert!(frames[0].contains("Error: "));
        assert!(frames[0].contains("party_planner"));
    }

    #[test]
    fn test_malformed_request_uses_placeholder_name() {
        let message = Message::assistant().with_tool_request(
            "call_3",
            Err(AgentError::InvalidParameters("bad json".to_string())),
        );
        let frames = protocol_frames(&message);
        assert!(frames[0].contains(INVALID_TOOL_CALL_NAME));
    }

    #[tokio::test]
    async fn test_reply_streams_tool_round_trip_and_updates_history() {
        let state = test_state(vec![
            Canned::Reply(tesla_lookup()),
            Canned::Reply(
                Message::assistant().with_text("Dr. Tesla is an old friend from university."),
            ),
        ]);
        let id = state.sessions.create().await;
        let app = routes(state.clone());

        let response = app
            .oneshot(reply_request(&id, "Tell me about Dr. Nikola Tesla"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-vercel-ai-data-stream").unwrap(),
            "v1"
        );

        let body = body_text(response).await;
        let prefixes: Vec<&str> = body.lines().map(|line| &line[..2]).collect();
        assert_eq!(prefixes, vec!["9:", "a:", "0:", "d:"]);
        assert!(body.contains("old friend from university days"));
        assert!(body.contains("\"finishReason\":\"stop\""));
        assert!(body.contains("\"steps\":2"));

        let entry = state.sessions.get(&id).await.unwrap();
        let entry = entry.lock().await;
        let roles: Vec<Role> = entry.session.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert!(entry.last_trace.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_turn_restores_history() {
        let state = test_state(vec![Canned::Unauthorized]);
        let id = state.sessions.create().await;

        let response = routes(state.clone())
            .oneshot(reply_request(&id, "Hello"))
            .await
            .unwrap();
        let body = body_text(response).await;

        assert!(body.starts_with("3:"));
        assert!(body.contains("not authorized"));
        assert!(body.contains("\"finishReason\":\"error\""));

        let entry = state.sessions.get(&id).await.unwrap();
        let entry = entry.lock().await;
        assert!(entry.session.is_empty());
        assert!(entry.last_trace.is_none());
    }

    #[tokio::test]
    async fn test_reply_to_unknown_session() {
        let response = routes(test_state(vec![]))
            .oneshot(reply_request("missing", "Hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let state = test_state(vec![]);
        let id = state.sessions.create().await;
        let response = routes(state)
            .oneshot(reply_request(&id, "   "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_protocol_header_is_rejected() {
        let state = test_state(vec![]);
        let id = state.sessions.create().await;
        let mut request = reply_request(&id, "Hello");
        request
            .headers_mut()
            .insert("x-protocol", "text".parse().unwrap());

        let response = routes(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
