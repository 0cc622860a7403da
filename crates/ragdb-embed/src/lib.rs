//! ragdb-embed
//!
//! `Embedder` implementations: a deterministic feature-hashing embedder and a
//! local BGE-M3 model on candle. [`load_embedder`] picks one from settings.
use std::sync::Arc;

use ragdb_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings};
use ragdb_core::{Embedder, Result};

pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hashing::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

pub fn load_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.backend {
        EmbeddingBackend::Hash => {
            tracing::info!(dim = settings.dim, "using hash embedder");
            Ok(Arc::new(HashEmbedder::new(settings.dim)))
        }
        EmbeddingBackend::BgeM3 => {
            let configured = settings.model_dir.as_deref().map(expand_path);
            let dir = model::resolve_model_dir(configured.as_deref())?;
            Ok(Arc::new(BgeM3Embedder::load(&dir, settings.max_len)?))
        }
    }
}
