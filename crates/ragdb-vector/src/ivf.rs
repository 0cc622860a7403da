//! Inverted-file (clustered) approximate index.
//!
//! Build: spherical k-means over the unit vectors, seeded by farthest-point
//! selection so results are deterministic. Search: score the `nprobe` closest
//! centroids' member lists exactly. Use [`recall_at_k`] against a
//! [`crate::FlatIndex`] to check a parameter choice.
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use ragdb_core::{Error, IndexEntry, IndexHeader, Result, SearchHit, VectorIndex};

use crate::similarity::{dot, normalized, top_k};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfParams {
    /// Number of clusters; derived from the entry count when `None`.
    pub nlist: Option<usize>,
    /// Clusters scanned per query.
    pub nprobe: usize,
    pub max_iterations: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self { nlist: None, nprobe: 8, max_iterations: 20 }
    }
}

/// `sqrt(n)` clusters, clamped to `[1, min(n, 65536)]`.
pub fn compute_nlist(total: usize) -> usize {
    let sqrt_n = (total as f64).sqrt() as usize;
    sqrt_n.clamp(1, total.clamp(1, 65536))
}

#[derive(Debug)]
struct IvfSnapshot {
    base: Snapshot,
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<usize>>,
}

#[derive(Debug, Default)]
pub struct IvfIndex {
    params: IvfParams,
    current: RwLock<Option<Arc<IvfSnapshot>>>,
}

impl IvfIndex {
    pub fn new(params: IvfParams) -> Self {
        Self { params, current: RwLock::new(None) }
    }

    fn snapshot(&self) -> Result<Arc<IvfSnapshot>> {
        self.current.read().clone().ok_or(Error::EmptyIndex)
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let s = dot(centroid, v);
        if s > best_score {
            best = c;
            best_score = s;
        }
    }
    best
}

fn farthest_point_seeds(base: &Snapshot, nlist: usize) -> Vec<Vec<f32>> {
    let n = base.len();
    let mut centroids = vec![base.unit_row(0).to_vec()];
    let mut closest: Vec<f32> = (0..n).map(|i| dot(base.unit_row(i), &centroids[0])).collect();
    while centroids.len() < nlist {
        let mut pick = 0;
        for i in 1..n {
            if closest[i] < closest[pick] { pick = i; }
        }
        let seed = base.unit_row(pick).to_vec();
        for (i, c) in closest.iter_mut().enumerate() {
            *c = c.max(dot(base.unit_row(i), &seed));
        }
        centroids.push(seed);
    }
    centroids
}

fn train(base: &Snapshot, nlist: usize, max_iterations: usize) -> (Vec<Vec<f32>>, Vec<Vec<usize>>) {
    let n = base.len();
    let dim = base.header.dim;
    let mut centroids = farthest_point_seeds(base, nlist);
    let mut assignment: Vec<usize> = (0..n).map(|i| nearest_centroid(&centroids, base.unit_row(i))).collect();
    for _ in 0..max_iterations {
        let mut sums = vec![vec![0f32; dim]; nlist];
        let mut counts = vec![0usize; nlist];
        for (i, &c) in assignment.iter().enumerate() {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(base.unit_row(i)) { *s += x; }
        }
        for c in 0..nlist {
            if counts[c] > 0 { centroids[c] = normalized(&sums[c]); }
        }
        let next: Vec<usize> = (0..n).map(|i| nearest_centroid(&centroids, base.unit_row(i))).collect();
        if next == assignment { break; }
        assignment = next;
    }
    let mut lists = vec![Vec::new(); nlist];
    for (i, &c) in assignment.iter().enumerate() {
        lists[c].push(i);
    }
    (centroids, lists)
}

impl VectorIndex for IvfIndex {
    fn build(&self, header: IndexHeader, entries: Vec<IndexEntry>) -> Result<()> {
        let start = Instant::now();
        let base = Snapshot::new(header, entries)?;
        let (centroids, lists) = if base.len() == 0 {
            (Vec::new(), Vec::new())
        } else {
            let nlist = self.params.nlist.unwrap_or_else(|| compute_nlist(base.len())).clamp(1, base.len());
            train(&base, nlist, self.params.max_iterations)
        };
        let count = base.len();
        let nlist = centroids.len();
        *self.current.write() = Some(Arc::new(IvfSnapshot { base, centroids, lists }));
        tracing::info!(entries = count, nlist, elapsed_ms = start.elapsed().as_millis() as u64, "ivf index built");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.snapshot()?;
        let q = snapshot.base.normalize_query(query)?;
        let mut probes: Vec<(usize, f32)> = snapshot.centroids.iter().map(|c| dot(c, &q)).enumerate().collect();
        probes.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        probes.truncate(self.params.nprobe.max(1));
        let candidates = probes
            .iter()
            .flat_map(|&(c, _)| snapshot.lists[c].iter().copied())
            .map(|i| (i, dot(&q, snapshot.base.unit_row(i))))
            .collect();
        Ok(top_k(&snapshot.base.entries, candidates, k))
    }

    fn header(&self) -> Option<IndexHeader> {
        self.current.read().as_ref().map(|s| s.base.header.clone())
    }

    fn len(&self) -> usize {
        self.current.read().as_ref().map_or(0, |s| s.base.len())
    }

    fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.snapshot()?.base.entries.clone())
    }
}

/// Mean fraction of the exact top-k ids that `approx` also returns.
pub fn recall_at_k(approx: &dyn VectorIndex, exact: &dyn VectorIndex, queries: &[Vec<f32>], k: usize) -> Result<f32> {
    if queries.is_empty() { return Ok(1.0); }
    let mut total = 0f32;
    for q in queries {
        let truth: HashSet<String> = exact.search(q, k)?.into_iter().map(|h| h.chunk.id).collect();
        if truth.is_empty() { total += 1.0; continue; }
        let found = approx.search(q, k)?.into_iter().filter(|h| truth.contains(&h.chunk.id)).count();
        total += found as f32 / truth.len() as f32;
    }
    Ok(total / queries.len() as f32)
}
