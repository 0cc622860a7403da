//! ragdb-rag
//!
//! Retrieval-augmented answering on top of `ragdb-core` and `ragdb-vector`:
//! the retriever policy, context assembly, the generation boundary and the
//! `RagEngine` that ties ingestion and querying together.

pub mod assembler;
pub mod engine;
pub mod generation;
pub mod retriever;

pub use assembler::{assemble, AssembledContext};
pub use engine::{Answer, DocumentOutcome, DocumentStatus, IngestReport, QueryOptions, QueryResponse, RagEngine};
pub use generation::{build_prompt, generate_with_retry, GeminiGenerator, Generator, RetryPolicy};
pub use retriever::{filter_hits, Retriever, RetrieverConfig};
