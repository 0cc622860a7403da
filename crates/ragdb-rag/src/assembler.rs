//! Bounded prompt context from ranked chunks.
use serde::{Deserialize, Serialize};

use ragdb_core::{Chunk, ChunkId, RetrievalResult};

pub const SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub chunks_used: Vec<ChunkId>,
    /// Some retrieved chunk did not fit.
    pub truncated: bool,
}

/// `[<doc_id> | <label>]`, or `[<doc_id>]` for unlabelled chunks.
pub fn provenance(chunk: &Chunk) -> String {
    match &chunk.label {
        Some(label) => format!("[{} | {}]", chunk.doc_id, label),
        None => format!("[{}]", chunk.doc_id),
    }
}

/// Concatenate whole chunks in rank order until the next one would push the
/// character count past `max_context_chars`.
pub fn assemble(result: &RetrievalResult, max_context_chars: usize) -> AssembledContext {
    let mut out = AssembledContext::default();
    let mut used_chars = 0usize;
    let sep_chars = SEPARATOR.chars().count();
    for hit in result {
        let header = provenance(&hit.chunk);
        let sep = if out.text.is_empty() { 0 } else { sep_chars };
        let block = sep + header.chars().count() + 1 + hit.chunk.text.chars().count();
        if used_chars + block > max_context_chars {
            out.truncated = true;
            break;
        }
        if sep > 0 {
            out.text.push_str(SEPARATOR);
        }
        out.text.push_str(&header);
        out.text.push('\n');
        out.text.push_str(&hit.chunk.text);
        out.chunks_used.push(hit.chunk.id.clone());
        used_chars += block;
    }
    out
}
