use std::cmp::Ordering;

use ragdb_core::{IndexEntry, SearchHit};

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Unit-length copy of `v`; a zero vector stays zero.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n == 0.0 { return vec![0.0; v.len()]; }
    v.iter().map(|x| x / n).collect()
}

/// `dot(a,b) / (|a||b|)`, or 0 when either side has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
}

/// Descending score, then ascending chunk ordinal, document id and position.
fn rank_order(entries: &[IndexEntry], a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    let (ca, cb) = (&entries[a.0].chunk, &entries[b.0].chunk);
    b.1.total_cmp(&a.1)
        .then_with(|| ca.ordinal.cmp(&cb.ordinal))
        .then_with(|| ca.doc_id.cmp(&cb.doc_id))
        .then_with(|| a.0.cmp(&b.0))
}

/// Select and order the best `k` of `(position, score)` candidates.
pub(crate) fn top_k(entries: &[IndexEntry], mut candidates: Vec<(usize, f32)>, k: usize) -> Vec<SearchHit> {
    if k == 0 || candidates.is_empty() { return Vec::new(); }
    let cmp = |a: &(usize, f32), b: &(usize, f32)| rank_order(entries, a, b);
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, cmp);
        candidates.truncate(k);
    }
    candidates.sort_by(cmp);
    candidates
        .into_iter()
        .map(|(pos, score)| SearchHit { chunk: entries[pos].chunk.clone(), score })
        .collect()
}
