use std::fmt;
use thiserror::Error;

/// The pipeline step an error or timeout is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embed,
    VectorSearch,
    KeywordSearch,
    Rerank,
    Context,
    Router,
    Answer,
    Judge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Embed => "embed",
            Self::VectorSearch => "vector search",
            Self::KeywordSearch => "keyword search",
            Self::Rerank => "rerank",
            Self::Context => "context assembly",
            Self::Router => "router",
            Self::Answer => "answer",
            Self::Judge => "judge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed retrieval signals: {0}")]
    SignalParse(String),

    #[error("Retrieval failed during {stage}: {message}")]
    Retrieval { stage: Stage, message: String },

    #[error("Rerank failed: {0}")]
    Rerank(String),

    #[error("Generation failed during {stage}: {message}")]
    Generation { stage: Stage, message: String },

    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: Stage, after_ms: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed corpus record at {0}")]
    Corpus(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Retrieval { stage, .. } | Self::Generation { stage, .. } | Self::Timeout { stage, .. } => Some(*stage),
            Self::Rerank(_) => Some(Stage::Rerank),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
