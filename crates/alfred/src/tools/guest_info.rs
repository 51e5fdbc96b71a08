use std::sync::Arc;

use async_trait::async_trait;

use super::Tool;
use crate::errors::{AgentError, AgentResult};
use crate::retriever::HybridRetriever;

pub const NO_GUEST_FOUND: &str = "No matching guest information found.";

/// Looks guests up in the hybrid retriever
pub struct GuestInfoTool {
    retriever: Arc<HybridRetriever>,
    top_k: usize,
}

impl GuestInfoTool {
    pub fn new(retriever: Arc<HybridRetriever>) -> Self {
        let top_k = retriever.config().top_k;
        Self { retriever, top_k }
    }
}

#[async_trait]
impl Tool for GuestInfoTool {
    fn name(&self) -> &str {
        "guest_info_retriever"
    }

    fn description(&self) -> &str {
        "Retrieves detailed information about gala guests based on their name or relation."
    }

    fn parameter_description(&self) -> &str {
        "The name or relation of the guest you want information about."
    }

    async fn invoke(&self, query: &str) -> AgentResult<String> {
        let hits = self
            .retriever
            .search(query, self.top_k)
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Guest search failed: {}", e)))?;

        if hits.is_empty() {
            return Ok(NO_GUEST_FOUND.to_string());
        }
        Ok(hits
            .into_iter()
            .map(|hit| hit.snippet)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
