//! ragdb-vector
//!
//! Cosine-similarity indexes behind the `VectorIndex` trait (exact flat scan
//! and a clustered IVF approximation) plus LanceDB-backed persistence.

pub mod flat;
pub mod ivf;
pub mod schema;
pub mod similarity;
pub mod store;
pub mod table;

mod snapshot;

pub use flat::FlatIndex;
pub use ivf::{compute_nlist, recall_at_k, IvfIndex, IvfParams};
pub use store::{IndexStore, StoredHeader};

use std::sync::Arc;

use ragdb_core::config::{IndexKind, IndexSettings};
use ragdb_core::VectorIndex;

/// Index strategy selected by configuration.
pub fn index_from_settings(settings: &IndexSettings) -> Arc<dyn VectorIndex> {
    match settings.kind {
        IndexKind::Flat => Arc::new(FlatIndex::new()),
        IndexKind::Ivf => Arc::new(IvfIndex::new(IvfParams { nlist: settings.nlist, nprobe: settings.nprobe, ..IvfParams::default() })),
    }
}
