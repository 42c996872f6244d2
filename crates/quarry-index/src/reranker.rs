//! Reranker module for rescoring retrieved chunks with a relevance model.
//!
//! Supports any service exposing a Cohere/Jina style `/rerank` endpoint
//! (bge-reranker behind vLLM, Xinference, TEI and similar).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::chunk::Chunk;

/// Errors surfaced by a reranker.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Reranker request failed: {0}")]
    Network(String),

    #[error("Invalid reranker response: {0}")]
    InvalidResponse(String),
}

/// Trait for reranking retrieved chunks.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Relevance of each chunk to `query`; `scores[i]` belongs to `chunks[i]`.
    async fn rerank(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<f32>, RerankError>;
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Default reranker model name.
pub const DEFAULT_RERANK_MODEL: &str = "bge-reranker";

/// Reranker calling an HTTP `/rerank` endpoint.
pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(base_url: String, model: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_RERANK_MODEL.to_string()),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rerank", self.base_url.trim_end_matches('/'))
    }

    /// Put scores back in input order, checking every input got exactly one.
    fn scores_in_input_order(
        mut results: Vec<RerankResult>,
        expected: usize,
    ) -> Result<Vec<f32>, RerankError> {
        if results.len() != expected {
            return Err(RerankError::InvalidResponse(format!(
                "expected {expected} results, got {}",
                results.len()
            )));
        }

        results.sort_by_key(|r| r.index);
        for (position, result) in results.iter().enumerate() {
            if result.index != position {
                return Err(RerankError::InvalidResponse(format!(
                    "result indices are not a permutation of 0..{expected}"
                )));
            }
        }

        Ok(results.into_iter().map(|r| r.relevance_score).collect())
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<f32>, RerankError> {
        if query.trim().is_empty() || chunks.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query,
            documents: chunks.iter().map(|c| c.content.as_str()).collect(),
            model: &self.model,
        };

        let mut req_builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            req_builder = req_builder.bearer_auth(key);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| RerankError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RerankError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RerankError::InvalidResponse(e.to_string()))?;

        debug!(documents = chunks.len(), model = %self.model, "Reranked chunks");
        Self::scores_in_input_order(parsed.results, chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, relevance_score: f32) -> RerankResult {
        RerankResult {
            index,
            relevance_score,
        }
    }

    #[test]
    fn test_restores_input_order() {
        let scores =
            HttpReranker::scores_in_input_order(vec![result(1, 0.9), result(0, 0.2)], 2).unwrap();
        assert_eq!(scores, vec![0.2, 0.9]);
    }

    #[test]
    fn test_rejects_wrong_count() {
        let err = HttpReranker::scores_in_input_order(vec![result(0, 0.9)], 2).unwrap_err();
        assert!(matches!(err, RerankError::InvalidResponse(_)));
    }

    #[test]
    fn test_rejects_duplicate_indices() {
        let err =
            HttpReranker::scores_in_input_order(vec![result(0, 0.9), result(0, 0.1)], 2).unwrap_err();
        assert!(matches!(err, RerankError::InvalidResponse(_)));
    }

    #[test]
    fn test_http_reranker_new() {
        let reranker = HttpReranker::new("http://localhost:8100/v1/".to_string(), None, None);
        assert_eq!(reranker.model, DEFAULT_RERANK_MODEL);
        assert_eq!(reranker.endpoint(), "http://localhost:8100/v1/rerank");
        assert!(reranker.api_key.is_none());
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_the_service() {
        // Nothing listens on port 9; any request would fail
        let reranker = HttpReranker::new("http://127.0.0.1:9".to_string(), None, None);
        let chunk = Chunk {
            digest: "d".to_string(),
            content: "fn a() {}".to_string(),
            filepath: "a.rs".to_string(),
            start_line: 0,
            end_line: 0,
            index: 0,
        };
        assert!(reranker.rerank("", &[chunk.clone()]).await.unwrap().is_empty());
        assert!(reranker.rerank("  \t ", &[chunk]).await.unwrap().is_empty());
        assert!(reranker.rerank("query", &[]).await.unwrap().is_empty());
    }
}
