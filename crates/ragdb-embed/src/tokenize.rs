use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use ragdb_core::{Error, Result};

const PAD_ID: u32 = 1;

/// Encode `text`, truncate or pad to `max_len`, and return `(input_ids, attention_mask)`
/// tensors of shape `[1, max_len]`.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer
        .encode(text, true)
        .map_err(|e| Error::Embedding(format!("Tokenization failed: {}", e)))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.resize(max_len, PAD_ID);
    mask.resize(max_len, 0);
    let to_tensor = |v: Vec<u32>| Tensor::from_iter(v, device).and_then(|t| t.reshape((1, max_len)));
    let input_ids = to_tensor(ids).map_err(embedding_err)?;
    let attention_mask = to_tensor(mask).map_err(embedding_err)?;
    Ok((input_ids, attention_mask))
}

pub(crate) fn embedding_err(e: candle_core::Error) -> Error {
    Error::Embedding(e.to_string())
}
