//! Cross-encoder reranking of the fused pool, plus `(source, block_idx)` dedup.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kbqa_core::error::{Error, Result, Stage};
use kbqa_core::traits::CrossEncoder;
use kbqa_core::types::{FusedCandidate, RerankedResult};
use tracing::debug;

use crate::stage::blocking_with_deadline;

pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>, timeout: Duration) -> Self {
        Self { encoder, timeout }
    }

    /// Score every candidate against `query` and keep the best `top_n`.
    pub async fn rerank(&self, query: &str, candidates: Vec<FusedCandidate>, top_n: usize) -> Result<Vec<RerankedResult>> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let encoder = Arc::clone(&self.encoder);
        let q = query.to_string();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = blocking_with_deadline(Stage::Rerank, self.timeout, move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            encoder.score(&q, &refs)
        })
        .await?;
        let out = apply_scores(candidates, &scores, top_n)?;
        debug!(kept = out.len(), best = out.first().map(|r| r.rerank_score), "reranked");
        Ok(out)
    }
}

/// Attach `scores` to `candidates`, sort best first (stable) and truncate.
pub fn apply_scores(candidates: Vec<FusedCandidate>, scores: &[f32], top_n: usize) -> Result<Vec<RerankedResult>> {
    if scores.len() != candidates.len() {
        return Err(Error::Rerank(format!("{} scores for {} candidates", scores.len(), candidates.len())));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(Error::Rerank(format!("non-finite score {bad}")));
    }
    let mut out: Vec<RerankedResult> = candidates
        .into_iter()
        .zip(scores)
        .map(|(c, &s)| RerankedResult { id: c.id, rerank_score: s.clamp(0.0, 1.0), metadata: c.metadata, text: c.text })
        .collect();
    out.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));
    out.truncate(top_n);
    Ok(out)
}

/// Drop repeated `(source, block_idx)` keys, keeping the first occurrence.
pub fn dedup_results(results: Vec<RerankedResult>) -> Vec<RerankedResult> {
    let mut seen = HashSet::new();
    results.into_iter().filter(|r| seen.insert(r.metadata.key())).collect()
}
