//! Contracts of the external scoring and storage services the pipeline uses.
//!
//! Implementations return `anyhow::Result`; the pipeline classifies failures
//! per stage into [`crate::error::Error`].

use async_trait::async_trait;

use crate::types::UnitRef;

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A nearest-neighbour match as returned by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub metadata: UnitRef,
    pub distance: f32,
    pub text: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `k` nearest stored vectors, closest first.
    async fn query(&self, embedding: &[f32], k: usize) -> anyhow::Result<Vec<VectorMatch>>;
}

/// A lexical match, best first. Raw keyword scores are deliberately absent.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub metadata: UnitRef,
    pub text: String,
}

pub trait KeywordIndex: Send + Sync {
    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<KeywordMatch>>;
}

pub trait CrossEncoder: Send + Sync {
    /// One score in [0, 1] per candidate, in input order.
    fn score(&self, query: &str, candidates: &[&str]) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;
}

/// Token counting and truncation only; never used for generation.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String>;
}
