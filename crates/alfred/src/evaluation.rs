use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::agent::{Agent, TurnStatus};
use crate::session::Session;

pub const DEFAULT_QUERIES: [&str; 3] = [
    "Tell me about Dr. Nikola Tesla",
    "What are the latest developments in wireless energy?",
    "Help me prepare for a conversation with Dr. Tesla about tech trends",
];

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationCase {
    pub query: String,
    pub response: Option<String>,
    pub status: Option<TurnStatus>,
    pub steps: usize,
    pub total_messages: usize,
    pub execution_time_secs: f64,
    pub trace_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub total_tests: usize,
    pub successful_runs: usize,
    pub success_rate: f64,
    pub average_execution_time_secs: f64,
    pub total_execution_time_secs: f64,
    pub results: Vec<EvaluationCase>,
}

impl EvaluationSummary {
    fn from_cases(results: Vec<EvaluationCase>) -> Self {
        let total_tests = results.len();
        let successful_runs = results.iter().filter(|case| case.success).count();
        let total_execution_time_secs: f64 =
            results.iter().map(|case| case.execution_time_secs).sum();
        let (success_rate, average_execution_time_secs) = if total_tests == 0 {
            (0.0, 0.0)
        } else {
            (
                successful_runs as f64 / total_tests as f64,
                total_execution_time_secs / total_tests as f64,
            )
        };

        Self {
            total_tests,
            successful_runs,
            success_rate,
            average_execution_time_secs,
            total_execution_time_secs,
            results,
        }
    }
}

/// Run each query as a fresh single-turn conversation. A run succeeds when its turn did not fail.
pub async fn run_evaluation<S: AsRef<str>>(agent: &Agent, queries: &[S]) -> EvaluationSummary {
    let mut results = Vec::with_capacity(queries.len());

    for (index, query) in queries.iter().enumerate() {
        let query = query.as_ref();
        tracing::info!(test = index + 1, total = queries.len(), query, "evaluating");

        let mut session = Session::with_id(format!(
            "eval-session-{}-{}",
            Utc::now().timestamp(),
            index + 1
        ));
        let timer = Instant::now();
        let result = agent.respond(&mut session, query).await;
        let execution_time_secs = timer.elapsed().as_secs_f64();

        results.push(match result {
            Ok(outcome) => EvaluationCase {
                query: query.to_string(),
                response: Some(outcome.answer),
                status: Some(outcome.status),
                steps: outcome.steps,
                total_messages: session.len(),
                execution_time_secs,
                trace_id: Some(outcome.trace_id),
                success: true,
                error: None,
            },
            Err(e) => EvaluationCase {
                query: query.to_string(),
                response: None,
                status: None,
                steps: 0,
                total_messages: 0,
                execution_time_secs,
                trace_id: None,
                success: false,
                error: Some(e.to_string()),
            },
        });
    }

    EvaluationSummary::from_cases(results)
}
