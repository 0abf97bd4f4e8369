//! Per-query orchestration: retrieve, fuse, rerank, gate, assemble, answer.
//!
//! Each query's state is local to the call, so one [`Pipeline`] can serve
//! concurrent queries behind an `Arc` without locking.

use std::sync::Arc;
use std::time::Instant;

use kbqa_core::config::PipelineConfig;
use kbqa_core::corpus::Corpus;
use kbqa_core::error::Result;
use kbqa_core::traits::{ChatModel, CrossEncoder, Embedder, KeywordIndex, TextTokenizer, VectorIndex};
use kbqa_core::types::{FinalResult, RerankedResult, RetrievalScores, RetrievalSignals, RouteAction, RouterDecision};
use serde::Serialize;
use tracing::{info, warn};

use crate::answer::{low_retrieval_conf, AnswerJudge};
use crate::context::{AssembledContext, ContextAssembler};
use crate::fusion::rrf_fuse;
use crate::rerank::{dedup_results, Reranker};
use crate::retrieve::{DenseRetriever, SparseRetriever};
use crate::router::ConfidenceGate;

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub keyword_index: Arc<dyn KeywordIndex>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    pub tokenizer: Arc<dyn TextTokenizer>,
    pub answer_llm: Arc<dyn ChatModel>,
    pub router_llm: Arc<dyn ChatModel>,
}

/// Everything retrieval produced for one query, before any generation.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub dense_hits: usize,
    pub sparse_hits: usize,
    pub fused: usize,
    pub reranked: Vec<RerankedResult>,
    pub signals: RetrievalSignals,
}

pub struct Pipeline {
    config: PipelineConfig,
    corpus: Arc<Corpus>,
    tokenizer: Arc<dyn TextTokenizer>,
    dense: DenseRetriever,
    sparse: SparseRetriever,
    reranker: Reranker,
    gate: ConfidenceGate,
    answer_judge: AnswerJudge,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, corpus: Arc<Corpus>, services: Services) -> Result<Self> {
        config.validate()?;
        let t = &config.timeouts;
        Ok(Self {
            dense: DenseRetriever::new(services.embedder, services.vector_index, t.embed(), t.vector()),
            sparse: SparseRetriever::new(services.keyword_index, t.keyword()),
            reranker: Reranker::new(services.cross_encoder, t.rerank()),
            gate: ConfidenceGate::new(services.router_llm, config.router.clone(), t.chat()),
            answer_judge: AnswerJudge::new(services.answer_llm, config.answer.clone(), t.chat()),
            tokenizer: services.tokenizer,
            corpus,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Dense and sparse retrieval in parallel, then fusion, reranking over
    /// `top_rerank * rerank_pool_factor` candidates, and dedup down to
    /// `top_rerank`. Any service failure aborts the attempt.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        let r = &self.config.retrieval;
        let (dense, sparse) = tokio::try_join!(self.dense.retrieve(query, r.k_dense), self.sparse.retrieve(query, r.k_sparse))?;
        let fused = rrf_fuse(&dense, &sparse, r.rrf_k, r.top_fuse);
        let fused_len = fused.len();

        let pool = r.top_rerank.saturating_mul(r.rerank_pool_factor);
        let mut reranked = dedup_results(self.reranker.rerank(query, fused, pool).await?);
        reranked.truncate(r.top_rerank);

        let signals = RetrievalSignals::from_reranked(&reranked);
        info!(
            dense = dense.len(),
            sparse = sparse.len(),
            fused = fused_len,
            reranked = reranked.len(),
            top1 = signals.top1,
            avg_top5 = signals.avg_top5,
            "retrieval done"
        );
        Ok(Retrieval { dense_hits: dense.len(), sparse_hits: sparse.len(), fused: fused_len, reranked, signals })
    }

    pub fn assemble_context(&self, reranked: &[RerankedResult]) -> Result<AssembledContext> {
        let r = &self.config.retrieval;
        ContextAssembler::new(&self.corpus, self.tokenizer.as_ref(), r.neighbor_radius, r.max_context_tokens).assemble(reranked)
    }

    pub async fn route(&self, query: &str, signals: &RetrievalSignals) -> RouterDecision {
        self.gate.route(query, signals).await
    }

    /// Answer `query` end to end. Every failure is folded into a declined
    /// result carrying a readable reason.
    pub async fn answer(&self, query: &str) -> FinalResult {
        let start = Instant::now();
        let policy = &self.config.answer;

        let retrieval = match self.retrieve(query).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                return FinalResult::declined(format!("Retrieval failed: {e}"), policy.failure_confidence, RetrievalScores::default());
            }
        };
        let scores = retrieval.signals.scores();

        let decision = self.gate.route(query, &retrieval.signals).await;
        if decision.action != RouteAction::Rag {
            let reason = format!("Routed to {}: {}", decision.action, decision.reason);
            return with_route(FinalResult::declined(reason, policy.failure_confidence, scores), decision);
        }

        let context = match self.assemble_context(&retrieval.reranked) {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => return escalated("No context available".to_string(), policy.failure_confidence, scores),
            Err(e) => {
                warn!(error = %e, "context assembly failed");
                return escalated(format!("Context assembly failed: {e}"), policy.failure_confidence, scores);
            }
        };

        let low = low_retrieval_conf(&retrieval.signals, policy);
        let outcome = match self.answer_judge.run(query, &context, low).await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, timeout = e.is_timeout(), "generation failed, escalating");
                return escalated(format!("Generation failed, escalating to support: {e}"), policy.failure_confidence, scores);
            }
        };

        let a = outcome.answer;
        info!(can_answer = a.can_answer, confidence = a.confidence, ms = start.elapsed().as_millis(), "answered");
        FinalResult {
            can_answer: a.can_answer,
            confidence: a.confidence,
            answer: a.answer,
            reason: a.reason,
            sources: a.sources,
            retrieval_scores: scores,
            route: Some(decision),
        }
    }
}

fn with_route(mut result: FinalResult, decision: RouterDecision) -> FinalResult {
    result.route = Some(decision);
    result
}

/// A `rag` route that could not be completed is handed to support.
fn escalated(reason: String, confidence: f32, scores: RetrievalScores) -> FinalResult {
    let decision = RouterDecision { action: RouteAction::Escalate, confidence, reason: reason.clone() };
    with_route(FinalResult::declined(reason, confidence, scores), decision)
}
