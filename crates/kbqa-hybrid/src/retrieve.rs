//! The two retrieval channels.

use std::sync::Arc;
use std::time::Duration;

use kbqa_core::error::{Error, Result, Stage};
use kbqa_core::traits::{Embedder, KeywordIndex, VectorIndex};
use kbqa_core::types::RetrievalHit;
use tracing::debug;

use crate::stage::{blocking_with_deadline, with_deadline};

/// Similarity in (0, 1] from a vector distance; smaller distances score higher.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Embeds the query and asks the vector index for its nearest neighbours.
pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    embed_timeout: Duration,
    search_timeout: Duration,
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, embed_timeout: Duration, search_timeout: Duration) -> Self {
        Self { embedder, index, embed_timeout, search_timeout }
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedder = Arc::clone(&self.embedder);
        let texts = vec![query.to_string()];
        let embedded = blocking_with_deadline(Stage::Embed, self.embed_timeout, move || embedder.embed_batch(&texts)).await?;
        let vector = embedded.into_iter().next().ok_or_else(|| Error::Retrieval {
            stage: Stage::Embed,
            message: "embedder returned no vector".into(),
        })?;

        let matches = with_deadline(Stage::VectorSearch, self.search_timeout, self.index.query(&vector, k)).await?;
        debug!(hits = matches.len(), "dense retrieval");
        Ok(matches
            .into_iter()
            .take(k)
            .map(|m| RetrievalHit { id: m.id, score: distance_to_score(m.distance), metadata: m.metadata, text: m.text })
            .collect())
    }
}

/// Lexical retrieval. The index's own scores are discarded and replaced by a
/// rank-derived score (`k - rank`), which is all fusion needs.
pub struct SparseRetriever {
    index: Arc<dyn KeywordIndex>,
    timeout: Duration,
}

impl SparseRetriever {
    pub fn new(index: Arc<dyn KeywordIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    #[allow(clippy::cast_precision_loss)]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let index = Arc::clone(&self.index);
        let q = query.to_string();
        let matches = blocking_with_deadline(Stage::KeywordSearch, self.timeout, move || index.search(&q, k)).await?;
        debug!(hits = matches.len(), "sparse retrieval");
        Ok(matches
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, m)| RetrievalHit {
                id: format!("bm25-{}-{}", m.metadata.source, m.metadata.block_idx),
                score: (k - rank) as f32,
                metadata: m.metadata,
                text: m.text,
            })
            .collect())
    }
}
