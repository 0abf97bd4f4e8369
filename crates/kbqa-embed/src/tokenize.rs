use anyhow::{Result, anyhow};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// Encode `input` (a single text or a `(query, passage)` pair), then pad or
/// truncate to `max_len`. Returns `(input_ids, attention_mask)` shaped `[1, max_len]`.
pub fn tokenize_on_device<'s, E>(tokenizer: &Tokenizer, input: E, max_len: usize, pad_id: u32, device: &Device) -> Result<(Tensor, Tensor)>
where
    E: Into<EncodeInput<'s>>,
{
    let enc = tokenizer.encode(input, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
    if ids.len() < max_len { let pad = max_len - ids.len(); ids.extend(std::iter::repeat(pad_id).take(pad)); mask.extend(std::iter::repeat(0).take(pad)); }
    let input_ids = Tensor::from_iter(ids, device)?.reshape((1, max_len))?;
    let attention_mask = Tensor::from_iter(mask, device)?.reshape((1, max_len))?;
    Ok((input_ids, attention_mask))
}
