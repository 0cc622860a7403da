//! Domain types shared by the chunker, embedders, indexes and retriever.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;

/// A labelled region of a document, e.g. a page or a section heading.
///
/// `start` is a character offset into the document text; the section runs
/// until the next section starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub start: usize,
    pub label: String,
}

/// A source document. Immutable once ingested; re-ingesting the same `id`
/// replaces every chunk it produced before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), sections: Vec::new() }
    }

    pub fn with_sections(mut self, mut sections: Vec<Section>) -> Self {
        sections.sort_by_key(|s| s.start);
        self.sections = sections;
        self
    }

    /// Join pages with a blank line and label each one `page N` (1-based).
    pub fn from_pages<I, S>(id: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut sections = Vec::new();
        let mut offset = 0usize;
        for (i, page) in pages.into_iter().enumerate() {
            if i > 0 {
                text.push_str("\n\n");
                offset += 2;
            }
            let page = page.as_ref();
            sections.push(Section { start: offset, label: format!("page {}", i + 1) });
            text.push_str(page);
            offset += page.chars().count();
        }
        Self { id: id.into(), text, sections }
    }

    /// Label of the last section starting at or before `offset`.
    pub fn label_at(&self, offset: usize) -> Option<&str> {
        let idx = self.sections.partition_point(|s| s.start <= offset);
        idx.checked_sub(1).map(|i| self.sections[i].label.as_str())
    }
}

/// A contiguous span of a document used as the unit of retrieval.
///
/// - `id`: `"{doc_id}:{ordinal}"`, unique within an index
/// - `start`/`end`: half-open character offsets into the parent text
/// - `label`: page/section label inherited from the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub label: Option<String>,
}

impl Chunk {
    pub fn make_id(doc_id: &str, ordinal: usize) -> ChunkId {
        format!("{doc_id}:{ordinal}")
    }

    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Embedding model identity recorded by every built or persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexHeader {
    pub model_id: String,
    pub dim: usize,
}

impl IndexHeader {
    pub fn new(model_id: impl Into<String>, dim: usize) -> Self {
        Self { model_id: model_id.into(), dim }
    }
}

impl fmt::Display for IndexHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (d={})", self.model_id, self.dim)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

/// One ranked result. `score` is the cosine similarity; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hits in descending score order. Recomputed per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<SearchHit>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }

    pub fn ranked_ids(&self) -> Vec<(ChunkId, f32)> {
        self.hits.iter().map(|h| (h.chunk.id.clone(), h.score)).collect()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}
