use anyhow::{anyhow, Result};
use std::path::Path;
use tokenizers::Tokenizer;

use kbqa_core::traits::TextTokenizer;

/// A `tokenizer.json` tokenizer used only to count and cut context tokens.
pub struct HfTokenizer { inner: Tokenizer }

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", path.display(), e))?;
        Ok(Self { inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self.inner.encode(text, false).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        Ok(enc.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner.decode(ids, true).map_err(|e| anyhow!("Detokenization failed: {}", e))
    }
}
