//! Local candle models behind the core service traits: the query embedder,
//! the cross-encoder reranker and the tokenizer used for context budgeting.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor, DType};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use kbqa_core::traits::Embedder;

pub mod device;
pub mod hf_tokenizer;
pub mod pool;
pub mod rerank;
pub mod tokenize;

pub use hf_tokenizer::HfTokenizer;
pub use pool::masked_mean_l2;
pub use rerank::BgeReranker;

/// XLM-R pads with id 1.
pub(crate) const PAD_ID: u32 = 1;

pub struct BgeM3Embedder { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl BgeM3Embedder {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 embedder");
        let tokenizer = load_tokenizer(model_dir)?;
        let config = load_config(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim = config.hidden_size, "BGE-M3 embedder loaded");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size, max_len: 256 })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, PAD_ID, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let emb = masked_mean_l2(&hidden, &attention_mask)?;
        let emb_cpu: Vec<f32> = emb.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb_cpu.len() != self.dim { return Err(anyhow!("embedding has {} dims, expected {}", emb_cpu.len(), self.dim)); }
        if start.elapsed().as_millis() > 100 { warn!(ms = start.elapsed().as_millis(), "slow embedding"); }
        Ok(emb_cpu)
    }
}

impl Embedder for BgeM3Embedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { texts.iter().map(|t| self.embed_text(t)).collect() }
}

/// Deterministic hashed bag-of-words vectors for tests and offline development.
struct FakeEmbedder { dim: usize }
impl FakeEmbedder { fn new(dim: usize) -> Self { Self { dim } } }
impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 256 }
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let embed_one = |text: &str| {
            let mut v = vec![0f32; self.dim];
            for (i, token) in text.split_whitespace().enumerate() { let mut hasher = XxHash64::with_seed(0); token.to_lowercase().hash(&mut hasher); let h = hasher.finish(); let idx = (h as usize) % self.dim; let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32); v[idx] += val + (i as f32 % 3.0) * 0.01; }
            let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
        };
        Ok(texts.iter().map(|t| embed_one(t)).collect())
    }
}

/// The real embedder, or the fake one when `APP_USE_FAKE_EMBEDDINGS` is set.
pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake { info!("using FakeEmbedder"); return Ok(Box::new(FakeEmbedder::new(1024))); }
    let dir = match model_dir { Some(d) => d.to_path_buf(), None => resolve_model_dir()? };
    Ok(Box::new(BgeM3Embedder::new(&dir)?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { debug!(dir = %p.display(), "using APP_MODEL_DIR"); return Ok(p); } }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { debug!(dir = %p.display(), "using MODEL_DIR"); return Ok(p); } }
    let root = Path::new("../models/bge-m3"); if root.exists() { return Ok(root.to_path_buf()); }
    let local = Path::new("models/bge-m3"); if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

pub(crate) fn load_tokenizer(model_dir: &Path) -> Result<Tokenizer> {
    let path = model_dir.join("tokenizer.json");
    Tokenizer::from_file(&path).map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))
}

pub(crate) fn load_config(model_dir: &Path) -> Result<XLMRobertaConfig> {
    let path = model_dir.join("config.json");
    Ok(serde_json::from_str(&std::fs::read_to_string(&path)?)?)
}

/// Weights from `model.safetensors` when present, else `pytorch_model.bin`.
pub(crate) fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}
