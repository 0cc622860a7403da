//! Fixed-size overlapping chunker with stable character offsets.
//!
//! Chunk `i` starts at `i * (chunk_size - chunk_overlap)` and spans up to
//! `chunk_size` characters. With [`BoundaryPolicy::Whitespace`] a chunk end is
//! pulled back to the nearest whitespace or sentence break and the next chunk
//! starts `chunk_overlap` characters before it, so consecutive chunks still
//! overlap by exactly `chunk_overlap` characters.
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Cut exactly at `chunk_size`. Words may be split; use `Whitespace` to keep them whole.
    #[default]
    Exact,
    /// Prefer a whitespace or sentence break, fall back to the hard cut.
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub boundary: BoundaryPolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200, boundary: BoundaryPolicy::Exact }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self { chunk_size, chunk_overlap, boundary: BoundaryPolicy::Exact };
        config.validate()?;
        Ok(config)
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidChunkConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Lazily chunk a document; chunks inherit the document's section labels.
    pub fn chunks<'a>(&self, doc: &'a Document) -> Chunks<'a> {
        Chunks::new(self.config, &doc.id, &doc.text, &doc.sections)
    }

    pub fn chunk_text<'a>(&self, doc_id: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks::new(self.config, doc_id, text, &[])
    }
}

/// Iterator over the chunks of one text. Cloning it restarts from the
/// clone's position; a fresh call to [`Chunker::chunks`] restarts from zero.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    config: ChunkingConfig,
    doc_id: &'a str,
    text: &'a str,
    sections: &'a [Section],
    // byte offset of every char, plus text.len()
    bounds: Arc<[usize]>,
    next_start: usize,
    ordinal: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn new(config: ChunkingConfig, doc_id: &'a str, text: &'a str, sections: &'a [Section]) -> Self {
        let bounds: Arc<[usize]> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { config, doc_id, text, sections, bounds, next_start: 0, ordinal: 0, done: false }
    }

    fn char_count(&self) -> usize {
        self.bounds.len() - 1
    }

    fn char_at(&self, idx: usize) -> Option<char> {
        self.text.get(self.bounds[idx]..).and_then(|s| s.chars().next())
    }

    fn is_break(&self, pos: usize) -> bool {
        match self.char_at(pos - 1) {
            Some(c) if c.is_whitespace() => true,
            Some('.' | '!' | '?') => self.char_at(pos).map_or(true, char::is_whitespace),
            _ => false,
        }
    }

    // Never closer than overlap + 1 to the start, so the next start moves forward.
    fn soft_end(&self, start: usize, hard_end: usize) -> usize {
        let min_end = start + self.config.chunk_overlap + 1;
        (min_end..=hard_end).rev().find(|&p| self.is_break(p)).unwrap_or(hard_end)
    }

    fn label_at(&self, offset: usize) -> Option<String> {
        let idx = self.sections.partition_point(|s| s.start <= offset);
        idx.checked_sub(1).map(|i| self.sections[i].label.clone())
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let n = self.char_count();
        if self.done || n == 0 {
            return None;
        }
        let start = self.next_start;
        let hard_end = (start + self.config.chunk_size).min(n);
        let end = match self.config.boundary {
            BoundaryPolicy::Whitespace if hard_end < n => self.soft_end(start, hard_end),
            _ => hard_end,
        };
        let chunk = Chunk {
            id: Chunk::make_id(self.doc_id, self.ordinal),
            doc_id: self.doc_id.to_string(),
            ordinal: self.ordinal,
            start,
            end,
            text: self.text[self.bounds[start]..self.bounds[end]].to_string(),
            label: self.label_at(start),
        };
        if end >= n {
            self.done = true;
        } else {
            self.next_start = end - self.config.chunk_overlap;
        }
        self.ordinal += 1;
        Some(chunk)
    }
}

impl FusedIterator for Chunks<'_> {}

/// Validate `config` and collect every chunk of `doc`.
pub fn chunk_document(doc: &Document, config: ChunkingConfig) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(config)?.chunks(doc).collect())
}
