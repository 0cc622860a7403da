//! Query-time ranking policy: over-fetch, score threshold, optional
//! per-document cap, truncate to `k`.
use std::collections::HashMap;
use std::sync::Arc;

use ragdb_core::config::RetrievalSettings;
use ragdb_core::{Embedder, RetrievalResult, Result, SearchHit, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieverConfig {
    /// Candidates requested from the index per wanted result.
    pub overfetch_factor: usize,
    /// Most chunks a single document may contribute; unlimited when `None`.
    pub max_chunks_per_doc: Option<usize>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { overfetch_factor: 2, max_chunks_per_doc: None }
    }
}

impl From<&RetrievalSettings> for RetrieverConfig {
    fn from(s: &RetrievalSettings) -> Self {
        Self { overfetch_factor: s.overfetch_factor.max(1), max_chunks_per_doc: s.max_chunks_per_doc }
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: RetrieverConfig) -> Self {
        Self { embedder, index, config }
    }

    pub fn config(&self) -> RetrieverConfig {
        self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed `query_text` and rank it against the index. `k == 0` returns an
    /// empty result without embedding or searching.
    pub fn retrieve(&self, query_text: &str, k: usize, score_threshold: f32) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        let query = self.embedder.embed(query_text)?;
        self.retrieve_vector(&query, k, score_threshold)
    }

    pub fn retrieve_vector(&self, query: &[f32], k: usize, score_threshold: f32) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        let fetch = k.saturating_mul(self.config.overfetch_factor.max(1));
        let candidates = self.index.search(query, fetch)?;
        let fetched = candidates.len();
        let hits = filter_hits(candidates, k, score_threshold, self.config.max_chunks_per_doc);
        tracing::debug!(k, fetch, fetched, kept = hits.len(), score_threshold, "retrieved");
        Ok(RetrievalResult::new(hits))
    }
}

/// Apply threshold, per-document cap and `k` to hits already in rank order.
pub fn filter_hits(
    ranked: Vec<SearchHit>,
    k: usize,
    score_threshold: f32,
    max_chunks_per_doc: Option<usize>,
) -> Vec<SearchHit> {
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(k.min(ranked.len()));
    for hit in ranked {
        if out.len() == k {
            break;
        }
        if hit.score < score_threshold {
            continue;
        }
        if let Some(cap) = max_chunks_per_doc {
            let taken = per_doc.entry(hit.chunk.doc_id.clone()).or_default();
            if *taken >= cap {
                continue;
            }
            *taken += 1;
        }
        out.push(hit);
    }
    out
}
