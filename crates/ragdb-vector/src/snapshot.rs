use std::collections::HashSet;

use ragdb_core::{Error, IndexEntry, IndexHeader, Result};

use crate::similarity::normalized;

/// Immutable, validated index contents with unit-normalised vectors laid out
/// row-major for scanning.
#[derive(Debug)]
pub(crate) struct Snapshot {
    pub(crate) header: IndexHeader,
    pub(crate) entries: Vec<IndexEntry>,
    unit: Vec<f32>,
}

impl Snapshot {
    pub(crate) fn new(header: IndexHeader, entries: Vec<IndexEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut unit = Vec::with_capacity(entries.len() * header.dim);
        for entry in &entries {
            if entry.vector.len() != header.dim {
                return Err(Error::DimensionMismatch { expected: header.dim, actual: entry.vector.len() });
            }
            if entry.vector.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidIndexEntry(format!("non-finite vector for chunk {}", entry.id())));
            }
            if !seen.insert(entry.id()) {
                return Err(Error::InvalidIndexEntry(format!("duplicate chunk id {}", entry.id())));
            }
            unit.extend(normalized(&entry.vector));
        }
        drop(seen);
        Ok(Self { header, entries, unit })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn unit_row(&self, i: usize) -> &[f32] {
        let dim = self.header.dim;
        &self.unit[i * dim..(i + 1) * dim]
    }

    pub(crate) fn normalize_query(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.header.dim {
            return Err(Error::DimensionMismatch { expected: self.header.dim, actual: query.len() });
        }
        Ok(normalized(query))
    }
}
