//! Arrow layout of a persisted index generation and conversions to/from
//! [`IndexEntry`] rows.
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use ragdb_core::{Chunk, Error, IndexEntry, Result};

pub fn build_entries_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("seq", DataType::Int64, false),
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("ordinal", DataType::Int64, false),
        Field::new("start", DataType::Int64, false),
        Field::new("end", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("label", DataType::Utf8, true),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
    ]))
}

/// Rows `offset..offset+entries.len()` of a generation, `seq` numbered from `offset`.
pub fn entries_to_batch(entries: &[IndexEntry], dim: usize, offset: usize) -> Result<RecordBatch> {
    let mut seqs = Vec::with_capacity(entries.len());
    let mut ids = Vec::with_capacity(entries.len());
    let mut doc_ids = Vec::with_capacity(entries.len());
    let mut ordinals = Vec::with_capacity(entries.len());
    let mut starts = Vec::with_capacity(entries.len());
    let mut ends = Vec::with_capacity(entries.len());
    let mut texts = Vec::with_capacity(entries.len());
    let mut labels: Vec<Option<String>> = Vec::with_capacity(entries.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if entry.vector.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: entry.vector.len() });
        }
        let c = &entry.chunk;
        seqs.push((offset + i) as i64);
        ids.push(c.id.clone());
        doc_ids.push(c.doc_id.clone());
        ordinals.push(c.ordinal as i64);
        starts.push(c.start as i64);
        ends.push(c.end as i64);
        texts.push(c.text.clone());
        labels.push(c.label.clone());
        vectors.push(Some(entry.vector.iter().map(|&x| Some(x)).collect()));
    }
    RecordBatch::try_new(
        build_entries_schema(dim),
        vec![
            Arc::new(Int64Array::from(seqs)),
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(Int64Array::from(ordinals)),
            Arc::new(Int64Array::from(starts)),
            Arc::new(Int64Array::from(ends)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(labels)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim as i32)),
        ],
    )
    .map_err(Error::storage)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Storage(format!("column {name} missing or not utf8")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| Error::Storage(format!("column {name} missing or not int64")))
}

fn to_usize(v: i64, what: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| Error::InvalidIndexEntry(format!("negative {what}: {v}")))
}

/// Decode a batch into `(seq, entry)` pairs.
pub fn batch_to_entries(batch: &RecordBatch) -> Result<Vec<(i64, IndexEntry)>> {
    let seq = int_col(batch, "seq")?;
    let id = string_col(batch, "id")?;
    let doc_id = string_col(batch, "doc_id")?;
    let ordinal = int_col(batch, "ordinal")?;
    let start = int_col(batch, "start")?;
    let end = int_col(batch, "end")?;
    let text = string_col(batch, "text")?;
    let label = string_col(batch, "label")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::Storage("column vector missing or not a fixed-size list".into()))?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if !vectors.is_valid(i) {
            return Err(Error::InvalidIndexEntry(format!("chunk {} has no vector", id.value(i))));
        }
        let inner = vectors.value(i);
        let vector = inner.as_primitive::<Float32Type>().values().to_vec();
        let chunk = Chunk {
            id: id.value(i).to_string(),
            doc_id: doc_id.value(i).to_string(),
            ordinal: to_usize(ordinal.value(i), "ordinal")?,
            start: to_usize(start.value(i), "start")?,
            end: to_usize(end.value(i), "end")?,
            text: text.value(i).to_string(),
            label: (!label.is_null(i)).then(|| label.value(i).to_string()),
        };
        out.push((seq.value(i), IndexEntry { chunk, vector }));
    }
    Ok(out)
}
