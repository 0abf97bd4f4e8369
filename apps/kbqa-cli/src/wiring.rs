//! Builds the concrete services named in the config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use kbqa_core::config::{resolve_with_base, PipelineConfig};
use kbqa_core::corpus::Corpus;
use kbqa_core::traits::{ChatModel, Embedder};
use kbqa_embed::{get_default_embedder, BgeReranker, HfTokenizer};
use kbqa_hybrid::{Pipeline, Services};
use kbqa_llm::OpenAiChatClient;
use kbqa_text::TantivyKeywordIndex;
use kbqa_vector::{open_collection, open_db, LanceVectorIndex};
use tracing::{info, warn};

pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.base, p)
    }

    pub fn embed_model_dir(&self, cfg: &PipelineConfig) -> Option<PathBuf> {
        cfg.models.embed_model_dir.as_deref().map(|d| self.resolve(d))
    }

    fn tokenizer_path(&self, cfg: &PipelineConfig) -> PathBuf {
        match (&cfg.models.tokenizer_path, &cfg.models.embed_model_dir) {
            (Some(p), _) => self.resolve(p),
            (None, Some(dir)) => self.resolve(dir).join("tokenizer.json"),
            (None, None) => self.resolve("models/bge-m3/tokenizer.json"),
        }
    }
}

pub fn load_corpus(cfg: &PipelineConfig, paths: &Paths) -> Result<Arc<Corpus>> {
    let path = paths.resolve(&cfg.data.chunks_path);
    let corpus = Corpus::load_jsonl(&path).with_context(|| format!("loading corpus from {}", path.display()))?;
    info!(units = corpus.len(), path = %path.display(), "corpus loaded");
    Ok(Arc::new(corpus))
}

pub fn load_embedder(cfg: &PipelineConfig, paths: &Paths) -> Result<Arc<dyn Embedder>> {
    let dir = paths.embed_model_dir(cfg);
    Ok(Arc::from(get_default_embedder(dir.as_deref())?))
}

fn chat_client(cfg: &PipelineConfig, model: &str, temperature: f32) -> Result<Arc<dyn ChatModel>> {
    let m = &cfg.models;
    let api_key = std::env::var(&m.api_key_env).ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        warn!(var = %m.api_key_env, "no API key set, sending unauthenticated chat requests");
    }
    let client = OpenAiChatClient::new(&m.chat_base_url, model, temperature, api_key, cfg.timeouts.chat())?;
    Ok(Arc::new(client))
}

pub fn router_llm(cfg: &PipelineConfig) -> Result<Arc<dyn ChatModel>> {
    chat_client(cfg, &cfg.models.router_model, cfg.models.router_temperature)
}

pub fn answer_llm(cfg: &PipelineConfig) -> Result<Arc<dyn ChatModel>> {
    chat_client(cfg, &cfg.models.chat_model, cfg.models.chat_temperature)
}

pub async fn build_pipeline(cfg: PipelineConfig, paths: &Paths) -> Result<Pipeline> {
    let corpus = load_corpus(&cfg, paths)?;
    let keyword_index = TantivyKeywordIndex::build(Arc::clone(&corpus))?;

    let db_dir = paths.resolve(&cfg.data.lancedb_dir);
    let conn = open_db(&path_str(&db_dir)?).await?;
    let table = open_collection(&conn, &cfg.data.table)
        .await
        .with_context(|| format!("vector collection '{}' not found; run `kbqa index` first", cfg.data.table))?;

    let reranker = BgeReranker::new(&paths.resolve(&cfg.models.reranker_model_dir))?;
    let tokenizer = HfTokenizer::from_file(&paths.tokenizer_path(&cfg))?;

    let services = Services {
        embedder: load_embedder(&cfg, paths)?,
        vector_index: Arc::new(LanceVectorIndex::new(table)),
        keyword_index: Arc::new(keyword_index),
        cross_encoder: Arc::new(reranker),
        tokenizer: Arc::new(tokenizer),
        answer_llm: answer_llm(&cfg)?,
        router_llm: router_llm(&cfg)?,
    };
    Ok(Pipeline::new(cfg, corpus, services)?)
}

pub fn path_str(p: &Path) -> Result<String> {
    p.to_str().map(str::to_string).ok_or_else(|| anyhow!("path is not valid UTF-8: {}", p.display()))
}
