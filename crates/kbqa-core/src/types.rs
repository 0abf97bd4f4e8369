//! Domain types shared by the retrieval channels and the answer pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a corpus unit: the document it came from and its position
/// inside that document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub source: String,
    pub block_idx: usize,
}

impl UnitKey {
    pub fn new(source: impl Into<String>, block_idx: usize) -> Self {
        Self { source: source.into(), block_idx }
    }
}

/// Renders as the `chunk_id` form `"{source}:{block_idx}"`.
impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.block_idx)
    }
}

/// An immutable indexed text block.
///
/// - `source`: document id the block belongs to
/// - `block_idx`: position of the block within `source`
/// - `section_path`: hierarchical heading string (e.g. "Manual > Cleaning")
/// - `text`: the payload handed to retrieval and generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusUnit {
    pub source: String,
    pub block_idx: usize,
    #[serde(default)]
    pub section_path: String,
    pub text: String,
}

impl CorpusUnit {
    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.source.clone(), self.block_idx)
    }

    pub fn chunk_id(&self) -> String {
        self.key().to_string()
    }

    pub fn unit_ref(&self) -> UnitRef {
        UnitRef {
            source: self.source.clone(),
            block_idx: self.block_idx,
            section_path: self.section_path.clone(),
        }
    }
}

/// The metadata a hit carries back to its corpus unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub source: String,
    pub block_idx: usize,
    #[serde(default)]
    pub section_path: String,
}

impl UnitRef {
    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.source.clone(), self.block_idx)
    }

    pub fn chunk_id(&self) -> String {
        self.key().to_string()
    }
}

/// A hit from one retrieval channel. `score` is channel-specific (similarity
/// for dense, rank-derived for sparse) and higher is always better, but it is
/// not comparable across channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub score: f32,
    pub metadata: UnitRef,
    pub text: String,
}

/// One entry of the fused pool. `fused_score` is the RRF sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub id: String,
    pub fused_score: f32,
    pub metadata: UnitRef,
    pub text: String,
}

/// A candidate scored by the cross-encoder, normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub id: String,
    pub rerank_score: f32,
    pub metadata: UnitRef,
    pub text: String,
}

/// A piece of answer context. `chunk_id` is `"{source}:{block_idx}"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub chunk_id: String,
    pub text: String,
}

/// Coarse summary of reranked retrieval quality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSignals {
    #[serde(default)]
    pub top1: f32,
    #[serde(default)]
    pub avg_top5: f32,
    #[serde(default)]
    pub hits: usize,
    #[serde(default)]
    pub sections: Vec<String>,
}

impl RetrievalSignals {
    /// `top1` is the best score, `avg_top5` the mean of up to five best
    /// scores, `hits` the number of results. Expects `reranked` sorted best
    /// first. `sections` lists distinct section paths in rank order.
    pub fn from_reranked(reranked: &[RerankedResult]) -> Self {
        let top1 = reranked.first().map_or(0.0, |r| r.rerank_score);
        let top5: Vec<f32> = reranked.iter().take(5).map(|r| r.rerank_score).collect();
        #[allow(clippy::cast_precision_loss)]
        let avg_top5 = top5.iter().sum::<f32>() / top5.len().max(1) as f32;
        let mut sections: Vec<String> = Vec::new();
        for r in reranked {
            let s = &r.metadata.section_path;
            if !s.is_empty() && !sections.iter().any(|x| x == s) {
                sections.push(s.clone());
            }
        }
        Self { top1, avg_top5, hits: reranked.len(), sections }
    }

    pub fn scores(&self) -> RetrievalScores {
        RetrievalScores { top1: self.top1, avg_top5: self.avg_top5, hits: self.hits }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    Rag,
    Escalate,
    Db,
    Api,
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rag => "rag",
            Self::Escalate => "escalate",
            Self::Db => "db",
            Self::Api => "api",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub action: RouteAction,
    pub confidence: f32,
    #[serde(default)]
    pub reason: String,
}

/// Structured output of the answer pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub can_answer: bool,
    pub confidence: f32,
    pub answer: String,
    pub reason: String,
    pub sources: Vec<String>,
}

/// Structured output of the judge pass. `hallucination_level` is
/// 0 (none), 1 (minor) or 2 (severe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub is_supported: bool,
    pub hallucination_level: u8,
    pub overall_confidence: f32,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalScores {
    pub top1: f32,
    pub avg_top5: f32,
    pub hits: usize,
}

/// The boundary object handed to the escalation/UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub can_answer: bool,
    pub confidence: f32,
    pub answer: String,
    pub reason: String,
    pub sources: Vec<String>,
    pub retrieval_scores: RetrievalScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouterDecision>,
}

impl FinalResult {
    /// A result that declines to answer, used for escalation and failures.
    pub fn declined(reason: impl Into<String>, confidence: f32, retrieval_scores: RetrievalScores) -> Self {
        Self {
            can_answer: false,
            confidence,
            answer: String::new(),
            reason: reason.into(),
            sources: Vec::new(),
            retrieval_scores,
            route: None,
        }
    }
}
