//! services/api/src/adapters/embeddings.rs
//!
//! This module contains the embedding adapter, which implements the
//! `EmbeddingService` port against an Ollama embeddings endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use autofix_core::ports::{EmbeddingService, PortError, PortResult};

/// An adapter that produces embeddings via Ollama's `/api/embeddings` endpoint.
#[derive(Clone)]
pub struct OllamaEmbeddings {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEmbeddings {
    /// Creates a new `OllamaEmbeddings` for the given base URL and model.
    pub fn new(http: reqwest::Client, base_url: &str, model: String) -> Self {
        Self {
            http,
            url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingService for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let response = self
            .http
            .post(&self.url)
            .json(&EmbeddingsRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| PortError::Upstream(format!("Embedding request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| PortError::Upstream(format!("Embedding request failed: {}", e)))?;

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(format!("Malformed embedding response: {}", e)))?;
        Ok(body.embedding)
    }

    // The endpoint embeds one prompt per call, so a batch is a sequence of calls.
    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}
