//! Hybrid guest search: cosine similarity over embeddings fused with normalised BM25.
pub mod bm25;
pub mod embedding;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use self::bm25::Bm25Index;
use self::embedding::{cosine_similarity, Embedder};
use crate::guests::GuestStore;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.6;
pub const DEFAULT_BM25_WEIGHT: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverConfig {
    pub top_k: usize,
    pub vector_weight: f32,
    pub bm25_weight: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            bm25_weight: DEFAULT_BM25_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    /// The guest's name
    pub guest: String,
    pub snippet: String,
    pub score: f32,
}

pub struct HybridRetriever {
    store: GuestStore,
    snippets: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    bm25: Bm25Index,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl HybridRetriever {
    /// Index every guest. Guest embeddings are computed once, here.
    pub async fn build(
        store: GuestStore,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        let snippets: Vec<String> = store.guests().iter().map(|g| g.snippet()).collect();
        let embeddings = embedder.embed(&snippets).await?;
        if embeddings.len() != snippets.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} guests",
                embeddings.len(),
                snippets.len()
            ));
        }
        let bm25 = Bm25Index::new(&snippets);
        tracing::debug!(guests = snippets.len(), "indexed guest list");

        Ok(Self {
            store,
            snippets,
            embeddings,
            bm25,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn store(&self) -> &GuestStore {
        &self.store
    }

    /// Up to `k` guests ranked by fused score, most relevant first. Ties keep dataset order
    /// and guests scoring zero are left out.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if self.snippets.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let sparse = self.bm25.scores(query);
        let max_sparse = sparse.iter().copied().fold(0.0f64, f64::max);

        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .zip(&sparse)
            .enumerate()
            .map(|(index, (embedding, &bm25))| {
                let dense = cosine_similarity(&query_embedding, embedding).max(0.0);
                let sparse = if max_sparse > 0.0 {
                    (bm25 / max_sparse) as f32
                } else {
                    0.0
                };
                let score = self.config.vector_weight * dense + self.config.bm25_weight * sparse;
                (index, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // stable sort, so equal scores stay in dataset order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(index, score)| {
                let guest = self.store.get(index)?;
                Some(RetrievalHit {
                    guest: guest.name.clone(),
                    snippet: self.snippets[index].clone(),
                    score,
                })
            })
            .collect())
    }
}
