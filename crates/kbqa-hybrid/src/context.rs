//! Turns reranked hits into a token-bounded context.
//!
//! Each hit is widened to its `block_idx ± radius` neighbours within the same
//! section. A unit is emitted at most once across all hits. The first unit
//! that does not fit is truncated to the remaining budget and assembly stops.

use std::collections::HashSet;

use kbqa_core::corpus::Corpus;
use kbqa_core::error::{Error, Result, Stage};
use kbqa_core::traits::TextTokenizer;
use kbqa_core::types::{ContextChunk, RerankedResult, UnitKey};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub chunks: Vec<ContextChunk>,
    pub tokens_used: usize,
    /// A chunk was cut short by the budget.
    pub truncated: bool,
    /// Built from the hits' own text because no neighbour survived.
    pub fallback: bool,
}

impl AssembledContext {
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct ContextAssembler<'a> {
    corpus: &'a Corpus,
    tokenizer: &'a dyn TextTokenizer,
    radius: usize,
    max_tokens: usize,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(corpus: &'a Corpus, tokenizer: &'a dyn TextTokenizer, radius: usize, max_tokens: usize) -> Self {
        Self { corpus, tokenizer, radius, max_tokens }
    }

    pub fn assemble(&self, hits: &[RerankedResult]) -> Result<AssembledContext> {
        let mut ctx = self.collect_with_neighbors(hits)?;
        if ctx.chunks.is_empty() && !hits.is_empty() {
            warn!(hits = hits.len(), "no neighbour context, falling back to hit text");
            ctx = self.fallback_from_hits(hits)?;
        }
        debug!(chunks = ctx.chunks.len(), tokens = ctx.tokens_used, truncated = ctx.truncated, fallback = ctx.fallback, "context assembled");
        Ok(ctx)
    }

    fn collect_with_neighbors(&self, hits: &[RerankedResult]) -> Result<AssembledContext> {
        let mut ctx = AssembledContext::default();
        let mut seen: HashSet<UnitKey> = HashSet::new();

        for hit in hits {
            let meta = &hit.metadata;
            let lo = meta.block_idx.saturating_sub(self.radius);
            let hi = meta.block_idx.saturating_add(self.radius);
            for idx in lo..=hi {
                let key = UnitKey::new(meta.source.clone(), idx);
                if seen.contains(&key) {
                    continue;
                }
                let Some(unit) = self.corpus.get(&key) else { continue };
                if unit.section_path != meta.section_path || unit.text.is_empty() {
                    continue;
                }
                let ids = self.encode(&unit.text)?;
                if ctx.tokens_used + ids.len() > self.max_tokens {
                    let remaining = self.max_tokens - ctx.tokens_used;
                    if remaining > 0 {
                        let text = self.decode(&ids[..remaining])?;
                        ctx.chunks.push(ContextChunk { chunk_id: key.to_string(), text });
                        ctx.tokens_used += remaining;
                    }
                    ctx.truncated = true;
                    return Ok(ctx);
                }
                ctx.chunks.push(ContextChunk { chunk_id: key.to_string(), text: unit.text.clone() });
                ctx.tokens_used += ids.len();
                seen.insert(key);
            }
        }
        Ok(ctx)
    }

    /// The reranked texts themselves, in rank order, under the same budget.
    fn fallback_from_hits(&self, hits: &[RerankedResult]) -> Result<AssembledContext> {
        let mut ctx = AssembledContext { fallback: true, ..AssembledContext::default() };
        for hit in hits {
            if ctx.tokens_used >= self.max_tokens {
                break;
            }
            if hit.text.is_empty() {
                continue;
            }
            let ids = self.encode(&hit.text)?;
            let take = ids.len().min(self.max_tokens - ctx.tokens_used);
            let text = if take == ids.len() { hit.text.clone() } else { self.decode(&ids[..take])? };
            ctx.truncated |= take < ids.len();
            ctx.chunks.push(ContextChunk { chunk_id: hit.metadata.chunk_id(), text });
            ctx.tokens_used += take;
        }
        Ok(ctx)
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.tokenizer
            .encode(text)
            .map_err(|e| Error::Retrieval { stage: Stage::Context, message: format!("tokenize: {e}") })
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids)
            .map_err(|e| Error::Retrieval { stage: Stage::Context, message: format!("detokenize: {e}") })
    }
}
