//! Configuration loader, typed pipeline policy, and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys split on `__`). [`PipelineConfig`] is the one place numeric
//! policy lives; every field has a default so an empty figment is valid.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_in(Path::new("."))
    }

    /// Load with config files looked up in `base`.
    pub fn load_in(base: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the pipeline policy.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let cfg: PipelineConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read pipeline config: {}", e))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retrieval: RetrievalConfig,
    pub router: RouterThresholds,
    pub answer: AnswerPolicy,
    pub timeouts: TimeoutConfig,
    pub models: ModelConfig,
    pub data: DataConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let r = &self.router;
        for (name, v) in [
            ("router.high_top1", r.high_top1),
            ("router.high_avg_top5", r.high_avg_top5),
            ("router.low_top1", r.low_top1),
            ("router.low_avg_top5", r.low_avg_top5),
            ("answer.low_retrieval_top1", self.answer.low_retrieval_top1),
            ("answer.low_retrieval_avg_top5", self.answer.low_retrieval_avg_top5),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {v}")));
            }
        }
        if r.low_top1 > r.high_top1 {
            return Err(Error::InvalidConfig(format!("router.low_top1 ({}) exceeds router.high_top1 ({})", r.low_top1, r.high_top1)));
        }
        if r.low_avg_top5 > r.high_avg_top5 {
            return Err(Error::InvalidConfig(format!(
                "router.low_avg_top5 ({}) exceeds router.high_avg_top5 ({})",
                r.low_avg_top5, r.high_avg_top5
            )));
        }
        if r.low_min_hits > r.high_min_hits {
            return Err(Error::InvalidConfig(format!(
                "router.low_min_hits ({}) exceeds router.high_min_hits ({})",
                r.low_min_hits, r.high_min_hits
            )));
        }
        for (name, v) in [
            ("router.band_confidence", r.band_confidence),
            ("router.fallback_confidence", r.fallback_confidence),
            ("answer.min_confidence", self.answer.min_confidence),
            ("answer.plain_text_confidence", self.answer.plain_text_confidence),
            ("answer.failure_confidence", self.answer.failure_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {v}")));
            }
        }
        let q = &self.retrieval;
        if q.max_context_tokens == 0 {
            return Err(Error::InvalidConfig("retrieval.max_context_tokens must be positive".into()));
        }
        if q.top_rerank == 0 || q.top_fuse == 0 {
            return Err(Error::InvalidConfig("retrieval.top_fuse and retrieval.top_rerank must be positive".into()));
        }
        if q.rerank_pool_factor == 0 {
            return Err(Error::InvalidConfig("retrieval.rerank_pool_factor must be positive".into()));
        }
        let t = &self.timeouts;
        for (name, ms) in [
            ("timeouts.embed_ms", t.embed_ms),
            ("timeouts.vector_ms", t.vector_ms),
            ("timeouts.keyword_ms", t.keyword_ms),
            ("timeouts.rerank_ms", t.rerank_ms),
            ("timeouts.chat_ms", t.chat_ms),
        ] {
            if ms == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k_dense: usize,
    pub k_sparse: usize,
    pub top_fuse: usize,
    pub rrf_k: usize,
    pub top_rerank: usize,
    /// The reranker keeps `top_rerank * rerank_pool_factor` so dedup still
    /// has `top_rerank` entries to choose from.
    pub rerank_pool_factor: usize,
    pub neighbor_radius: usize,
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_dense: 40,
            k_sparse: 40,
            top_fuse: 40,
            rrf_k: 60,
            top_rerank: 6,
            rerank_pool_factor: 2,
            neighbor_radius: 2,
            max_context_tokens: 3000,
        }
    }
}

/// Bands of the confidence gate. High band needs all three `high_*` bounds,
/// low band triggers on any one `low_*` bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterThresholds {
    pub high_top1: f32,
    pub high_avg_top5: f32,
    pub high_min_hits: usize,
    pub low_top1: f32,
    pub low_avg_top5: f32,
    pub low_min_hits: usize,
    pub band_confidence: f32,
    pub fallback_confidence: f32,
}

impl Default for RouterThresholds {
    fn default() -> Self {
        Self {
            high_top1: 0.7,
            high_avg_top5: 0.5,
            high_min_hits: 3,
            low_top1: 0.35,
            low_avg_top5: 0.30,
            low_min_hits: 3,
            band_confidence: 0.9,
            fallback_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPolicy {
    /// Answers below this self-reported confidence are declined.
    pub min_confidence: f32,
    pub low_retrieval_top1: f32,
    pub low_retrieval_avg_top5: f32,
    /// Confidence given to an answer pass that replied in plain text.
    pub plain_text_confidence: f32,
    /// Confidence reported when generation fails outright.
    pub failure_confidence: f32,
    pub language: String,
}

impl Default for AnswerPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            low_retrieval_top1: 0.35,
            low_retrieval_avg_top5: 0.30,
            plain_text_confidence: 0.7,
            failure_confidence: 0.0,
            language: "English".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embed_ms: u64,
    pub vector_ms: u64,
    pub keyword_ms: u64,
    pub rerank_ms: u64,
    pub chat_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { embed_ms: 10_000, vector_ms: 10_000, keyword_ms: 5_000, rerank_ms: 60_000, chat_ms: 120_000 }
    }
}

impl TimeoutConfig {
    pub fn embed(&self) -> Duration { Duration::from_millis(self.embed_ms) }
    pub fn vector(&self) -> Duration { Duration::from_millis(self.vector_ms) }
    pub fn keyword(&self) -> Duration { Duration::from_millis(self.keyword_ms) }
    pub fn rerank(&self) -> Duration { Duration::from_millis(self.rerank_ms) }
    pub fn chat(&self) -> Duration { Duration::from_millis(self.chat_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub embed_model_dir: Option<String>,
    pub reranker_model_dir: String,
    /// `tokenizer.json` used for context budgeting; defaults to the embedder's.
    pub tokenizer_path: Option<String>,
    pub chat_base_url: String,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub router_model: String,
    pub router_temperature: f32,
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embed_model_dir: None,
            reranker_model_dir: "models/bge-reranker-base".to_string(),
            tokenizer_path: None,
            chat_base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-5".to_string(),
            chat_temperature: 1.0,
            router_model: "gpt-4o-mini".to_string(),
            router_temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub chunks_path: String,
    pub lancedb_dir: String,
    pub table: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            chunks_path: "data/markdown/chunked/chunks.jsonl".to_string(),
            lancedb_dir: "indexes/lancedb".to_string(),
            table: "coffee_text".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bands_do_not_overlap() {
        let r = RouterThresholds::default();
        assert!(r.low_top1 <= r.high_top1);
        assert!(r.low_avg_top5 <= r.high_avg_top5);
        assert!(r.low_min_hits <= r.high_min_hits);
        PipelineConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.router.low_top1 = 0.8;
        let err = cfg.validate().expect_err("overlapping bands");
        assert!(err.to_string().contains("low_top1"));
    }

    #[test]
    fn nan_or_out_of_range_threshold_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.router.high_top1 = f32::NAN;
        let err = cfg.validate().expect_err("nan threshold");
        assert!(err.to_string().contains("router.high_top1"));

        let mut cfg = PipelineConfig::default();
        cfg.router.low_avg_top5 = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.timeouts.chat_ms = 0;
        let err = cfg.validate().expect_err("zero timeout");
        assert!(err.to_string().contains("timeouts.chat_ms"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.retrieval.max_context_tokens = 0;
        assert!(cfg.validate().is_err());
    }
}
