use anyhow::Result;
use std::path::Path;

use candle_core::{Device, DType, Tensor};
use candle_nn::ops::sigmoid;
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use kbqa_core::traits::CrossEncoder;

use crate::{device, load_config, load_tokenizer, load_var_builder, tokenize, PAD_ID};

/// BGE cross-encoder (`BAAI/bge-reranker-base` layout): one logit per
/// (query, passage) pair, squashed with a sigmoid into [0, 1].
pub struct BgeReranker { model: XLMRobertaForSequenceClassification, tokenizer: Tokenizer, device: Device, max_len: usize }

impl BgeReranker {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading cross-encoder reranker");
        let tokenizer = load_tokenizer(model_dir)?;
        let config = load_config(model_dir)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        Ok(Self { model, tokenizer, device, max_len: 512 })
    }

    fn score_pair(&self, query: &str, passage: &str) -> Result<f32> {
        let (input_ids, attention_mask) = tokenize::tokenize_on_device(&self.tokenizer, (query, passage), self.max_len, PAD_ID, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
        let prob = sigmoid(&logits)?.flatten_all()?.to_device(&Device::Cpu)?.to_vec1::<f32>()?;
        prob.first().copied().ok_or_else(|| anyhow::anyhow!("reranker returned no logits"))
    }
}

impl CrossEncoder for BgeReranker {
    fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        let scores = candidates.iter().map(|c| self.score_pair(query, c)).collect::<Result<Vec<_>>>()?;
        debug!(pairs = scores.len(), "cross-encoder scored");
        Ok(scores)
    }
}
