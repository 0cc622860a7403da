//! Durable index storage in LanceDB.
//!
//! Every `save` writes a complete new generation table and only then flips
//! the `active_table` pointer in the meta table, so a crash mid-save leaves
//! the previous generation loadable. The header of each generation is kept
//! as JSON under `header:<table>`.
use arrow_array::RecordBatchIterator;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ragdb_core::{Error, IndexEntry, IndexHeader, Result};

use crate::schema::{batch_to_entries, build_entries_schema, entries_to_batch};
use crate::table::{get_meta, open_db, set_meta, delete_meta, table_exists};

const ACTIVE_KEY: &str = "active_table";
const WRITE_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    pub model_id: String,
    pub dim: usize,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

impl StoredHeader {
    pub fn index_header(&self) -> IndexHeader {
        IndexHeader::new(self.model_id.clone(), self.dim)
    }
}

pub struct IndexStore {
    conn: Connection,
    root: PathBuf,
}

impl IndexStore {
    pub async fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let conn = open_db(&root.to_string_lossy()).await?;
        Ok(Self { conn, root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Header of the active generation, if any has been saved.
    pub async fn header(&self) -> Result<Option<StoredHeader>> {
        let Some(table) = get_meta(&self.conn, ACTIVE_KEY).await? else {
            return Ok(None);
        };
        let raw = get_meta(&self.conn, &format!("header:{table}"))
            .await?
            .ok_or_else(|| Error::Storage(format!("generation {table} has no header")))?;
        serde_json::from_str(&raw).map(Some).map_err(Error::storage)
    }

    /// Persist `entries` as the new active generation.
    ///
    /// Fails with `IndexVersionMismatch` when a generation built with another
    /// model or dimensionality is active; call [`IndexStore::reset`] first to
    /// switch models.
    pub async fn save(&self, header: &IndexHeader, entries: &[IndexEntry]) -> Result<StoredHeader> {
        if let Some(existing) = self.header().await? {
            if existing.index_header() != *header {
                return Err(Error::IndexVersionMismatch { expected: existing.index_header(), actual: header.clone() });
            }
        }
        let table = self.next_table_name().await?;
        let schema = build_entries_schema(header.dim);
        let batches = entries
            .chunks(WRITE_BATCH)
            .enumerate()
            .map(|(i, part)| entries_to_batch(part, header.dim, i * WRITE_BATCH))
            .collect::<Result<Vec<_>>>()?;
        let reader = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        self.conn.create_table(&table, Box::new(reader)).execute().await.map_err(Error::storage)?;

        let stored = StoredHeader {
            model_id: header.model_id.clone(),
            dim: header.dim,
            entry_count: entries.len(),
            built_at: Utc::now(),
        };
        let json = serde_json::to_string(&stored).map_err(Error::storage)?;
        set_meta(&self.conn, &format!("header:{table}"), &json).await?;
        set_meta(&self.conn, ACTIVE_KEY, &table).await?;
        tracing::info!(table = %table, entries = entries.len(), header = %header, "index generation saved");
        Ok(stored)
    }

    /// Load the active generation in its original entry order.
    ///
    /// With `expected` set, a stored header that differs fails with
    /// `IndexVersionMismatch` before any entry is read.
    pub async fn load(&self, expected: Option<&IndexHeader>) -> Result<(IndexHeader, Vec<IndexEntry>)> {
        let table = get_meta(&self.conn, ACTIVE_KEY)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no saved index under {}", self.root.display())))?;
        let stored = self
            .header()
            .await?
            .ok_or_else(|| Error::Storage(format!("generation {table} has no header")))?;
        let header = stored.index_header();
        if let Some(expected) = expected {
            if *expected != header {
                return Err(Error::IndexVersionMismatch { expected: header, actual: expected.clone() });
            }
        }

        let t = self.conn.open_table(&table).execute().await.map_err(Error::storage)?;
        let mut stream = t.query().execute().await.map_err(Error::storage)?;
        let mut rows = Vec::with_capacity(stored.entry_count);
        while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
            rows.extend(batch_to_entries(&batch)?);
        }
        rows.sort_by_key(|(seq, _)| *seq);
        if rows.len() != stored.entry_count {
            return Err(Error::InvalidIndexEntry(format!(
                "generation {table} holds {} entries, header says {}",
                rows.len(),
                stored.entry_count
            )));
        }
        if let Some(bad) = rows.iter().find(|(_, e)| e.vector.len() != header.dim) {
            return Err(Error::DimensionMismatch { expected: header.dim, actual: bad.1.vector.len() });
        }
        tracing::info!(table = %table, entries = rows.len(), "index generation loaded");
        Ok((header, rows.into_iter().map(|(_, e)| e).collect()))
    }

    /// Forget the active generation so the next save may use any header.
    pub async fn reset(&self) -> Result<()> {
        delete_meta(&self.conn, ACTIVE_KEY).await?;
        tracing::info!(root = %self.root.display(), "index store reset");
        Ok(())
    }

    async fn next_table_name(&self) -> Result<String> {
        let base = format!("entries_{}", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let mut name = base.clone();
        let mut n = 1;
        while table_exists(&self.conn, &name).await? {
            name = format!("{base}_{n}");
            n += 1;
        }
        Ok(name)
    }
}
