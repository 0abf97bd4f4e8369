//! Hybrid retrieval and confidence-gated answering over a fixed corpus.

pub mod answer;
pub mod context;
pub mod fusion;
pub mod pipeline;
pub mod prompts;
pub mod rerank;
pub mod retrieve;
pub mod router;
pub mod signals;
mod stage;
pub mod structured;

pub use answer::{enforce_answer_contract, low_retrieval_conf, reconcile, AnswerJudge, AnswerOutcome};
pub use context::{AssembledContext, ContextAssembler};
pub use fusion::{rrf_fuse, DEFAULT_RRF_K};
pub use pipeline::{Pipeline, Retrieval, Services};
pub use rerank::{apply_scores, dedup_results, Reranker};
pub use retrieve::{distance_to_score, DenseRetriever, SparseRetriever};
pub use router::{classify_band, Band, ConfidenceGate};
pub use signals::{parse_signals, try_parse_signals};
