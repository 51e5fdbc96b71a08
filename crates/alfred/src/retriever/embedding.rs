use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::bm25::tokenize;
use crate::providers::configs::OpenAiProviderConfig;
use crate::providers::utils::AuthenticationError;

pub const DEFAULT_DIMENSIONS: usize = 256;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Turns text into dense vectors for similarity search
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic local embedder: character trigrams of each token, hashed into a fixed
/// number of buckets and L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for trigram in padded.windows(3) {
                let feature: String = trigram.iter().collect();
                let hash = fnv1a(feature.as_bytes());
                let bucket = (hash % self.dimensions as u64) as usize;
                vector[bucket] += 1.0;
            }
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x100000001b3)
    })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Cosine similarity, zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Embeddings from an OpenAI-compatible `/v1/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client,
    host: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new<M: Into<String>>(config: &OpenAiProviderConfig, model: M) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            host: config.host.clone(),
            api_key: config.api_key.clone(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": self.model, "input": texts}))
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AuthenticationError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(anyhow!("Embedding request failed: {}", status));
        }

        let body: Value = response.json().await?;
        let mut data: Vec<(usize, Vec<f32>)> = body["data"]
            .as_array()
            .ok_or_else(|| anyhow!("Embedding response had no data"))?
            .iter()
            .enumerate()
            .map(|(position, item)| -> Result<(usize, Vec<f32>)> {
                let index = item["index"].as_u64().map_or(position, |i| i as usize);
                let embedding = serde_json::from_value(item["embedding"].clone())?;
                Ok((index, embedding))
            })
            .collect::<Result<_>>()?;
        data.sort_by_key(|(index, _)| *index);

        if data.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, received {}",
                texts.len(),
                data.len()
            ));
        }
        Ok(data.into_iter().map(|(_, embedding)| embedding).collect())
    }
}
