use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use ragserve_core::error::{Error, Result};

// XLM-RoBERTa pad token id.
const PAD_ID: u32 = 1;

/// Encode `text` and pad to exactly `max_len` tokens on `device`.
///
/// Inputs that tokenize past `max_len` are rejected rather than silently
/// clipped; callers chunk documents below the limit before embedding.
pub fn tokenize_padded(
    tokenizer: &Tokenizer,
    text: &str,
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len {
        return Err(Error::Embedding(format!(
            "input tokenizes to {} tokens, maximum is {}",
            ids.len(),
            max_len
        )));
    }
    if ids.len() < max_len {
        let pad = max_len - ids.len();
        ids.extend(std::iter::repeat(PAD_ID).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
    }
    let input_ids = Tensor::from_iter(ids, device)
        .and_then(|t| t.reshape((1, max_len)))
        .map_err(|e| Error::Embedding(e.to_string()))?;
    let attention_mask = Tensor::from_iter(mask, device)
        .and_then(|t| t.reshape((1, max_len)))
        .map_err(|e| Error::Embedding(e.to_string()))?;
    Ok((input_ids, attention_mask))
}
