//! ragdb-core
//!
//! Domain types, the chunker, the `Embedder`/`VectorIndex` capabilities, the
//! shared error taxonomy, configuration and corpus loading.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::{BoundaryPolicy, Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use traits::{Embedder, VectorIndex};
pub use types::{Chunk, ChunkId, Document, IndexEntry, IndexHeader, RetrievalResult, SearchHit, Section};
