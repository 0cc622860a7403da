//! BGE-M3 (XLM-RoBERTa) sentence embeddings via candle.
//!
//! Expects `tokenizer.json`, `config.json` and `pytorch_model.bin` in the model
//! directory. Output vectors are masked-mean pooled and L2-normalised.
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use ragdb_core::{Embedder, Error, Result};

use crate::pool::masked_mean_l2;
use crate::tokenize::{embedding_err, tokenize_on_device};

pub const BGE_M3_DIM: usize = 1024;

// Metal when built with the `metal` feature and a GPU is present.
fn inference_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            return dev;
        }
    }
    Device::Cpu
}

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    id: String,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = inference_device();
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::InvalidConfig(format!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))
        })?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)
            .map_err(|e| Error::InvalidConfig(format!("Bad model config {}: {}", config_path.display(), e)))?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path).map_err(embedding_err)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(embedding_err)?;
        tracing::info!(device = ?device, max_len, "BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, max_len, id: format!("bge-m3:len{max_len}:d{BGE_M3_DIM}") })
    }

    fn forward(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()
    }
}

impl Embedder for BgeM3Embedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        BGE_M3_DIM
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Embedding("input is empty after trimming".into()));
        }
        let start = Instant::now();
        let v = self.forward(text).map_err(embedding_err)?;
        if v.len() != BGE_M3_DIM {
            return Err(Error::Embedding(format!("model returned {} dims, expected {}", v.len(), BGE_M3_DIM)));
        }
        if start.elapsed().as_millis() > 100 {
            tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding");
        }
        Ok(v)
    }
}

/// Configured directory first, then `APP_MODEL_DIR`, `MODEL_DIR`, and the
/// conventional `models/bge-m3` locations.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = configured {
        if p.exists() { return Ok(p.to_path_buf()); }
        return Err(Error::NotFound(format!("model directory {}", p.display())));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { tracing::info!(var, dir = %p.display(), "using model dir from env"); return Ok(p); }
        }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(Error::NotFound("Could not locate BGE-M3 model directory".into()))
}
