//! Exact brute-force index: the reference semantics every other strategy is
//! validated against. O(n·D) per query.
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

use ragdb_core::{Error, IndexEntry, IndexHeader, Result, SearchHit, VectorIndex};

use crate::similarity::{dot, top_k};
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
pub struct FlatIndex {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.current.read().clone().ok_or(Error::EmptyIndex)
    }
}

impl VectorIndex for FlatIndex {
    fn build(&self, header: IndexHeader, entries: Vec<IndexEntry>) -> Result<()> {
        let start = Instant::now();
        let snapshot = Arc::new(Snapshot::new(header, entries)?);
        let count = snapshot.len();
        *self.current.write() = Some(snapshot);
        tracing::info!(entries = count, elapsed_ms = start.elapsed().as_millis() as u64, "flat index built");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.snapshot()?;
        let q = snapshot.normalize_query(query)?;
        let scores = (0..snapshot.len()).map(|i| (i, dot(&q, snapshot.unit_row(i)))).collect();
        Ok(top_k(&snapshot.entries, scores, k))
    }

    fn header(&self) -> Option<IndexHeader> {
        self.current.read().as_ref().map(|s| s.header.clone())
    }

    fn len(&self) -> usize {
        self.current.read().as_ref().map_or(0, |s| s.len())
    }

    fn entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.snapshot()?.entries.clone())
    }
}
