//! Process-scoped RAG state: one embedder, one index and the per-document
//! entries the index was last built from.
//!
//! Every write (single-document ingest or corpus rebuild) recomputes the full
//! entry list and swaps it into the index with one `build`, so readers never
//! see a partially ingested document.
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ragdb_core::chunker::Chunker;
use ragdb_core::config::{RetrievalSettings, Settings};
use ragdb_core::{Chunk, ChunkId, ChunkingConfig, Document, Embedder, Error, IndexEntry, IndexHeader, Result, SearchHit, VectorIndex};
use ragdb_vector::{IndexStore, StoredHeader};

use crate::assembler::assemble;
use crate::generation::{build_prompt, generate_with_retry, Generator, RetryPolicy};
use crate::retriever::{Retriever, RetrieverConfig};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the following context to answer the user's question. \
     If the answer is not in the context, say so.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub k: usize,
    pub score_threshold: f32,
    pub max_context_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from(&RetrievalSettings::default())
    }
}

impl From<&RetrievalSettings> for QueryOptions {
    fn from(s: &RetrievalSettings) -> Self {
        Self { k: s.k, score_threshold: s.score_threshold, max_context_chars: s.max_context_chars }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Context for the generation service; empty when nothing qualified.
    pub context: String,
    /// Ranked `(chunk id, score)` pairs of every retrieved chunk.
    pub hits: Vec<(ChunkId, f32)>,
    pub chunks: Vec<SearchHit>,
    /// Chunks that made it into `context`.
    pub context_ids: Vec<ChunkId>,
    pub truncated: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub response: String,
    pub context_ids: Vec<ChunkId>,
    pub num_chunks_retrieved: usize,
}

#[derive(Debug)]
pub enum DocumentStatus {
    Indexed { chunks: usize, skipped: usize },
    Failed(Error),
}

#[derive(Debug)]
pub struct DocumentOutcome {
    pub doc_id: String,
    pub status: DocumentStatus,
}

impl DocumentOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, DocumentStatus::Indexed { .. })
    }
}

/// Per-document results of a corpus rebuild, in input order.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub total_chunks: usize,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// Entries grouped by document in first-ingested order.
type Staging = Vec<(String, Vec<IndexEntry>)>;

struct Embedded {
    entries: Vec<IndexEntry>,
    skipped: usize,
}

/// Chunk and embed one document, `batch_size` chunks per embedding call.
/// `limit` bounds each call. Chunks the embedder rejects are skipped.
async fn embed_document(
    embedder: Arc<dyn Embedder>,
    doc: &Document,
    config: ChunkingConfig,
    batch_size: usize,
    limit: Duration,
) -> Result<Embedded> {
    let mut chunks = Chunker::new(config)?.chunks(doc);
    let mut entries = Vec::new();
    let mut skipped = 0;
    loop {
        let batch: Vec<Chunk> = chunks.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let worker = embedder.clone();
        match blocking_with_timeout(limit, move || worker.embed_batch(&texts)).await {
            Ok(vectors) => {
                entries.extend(batch.into_iter().zip(vectors).map(|(chunk, vector)| IndexEntry { chunk, vector }));
            }
            Err(Error::Embedding(_)) => {
                for chunk in batch {
                    let worker = embedder.clone();
                    let text = chunk.text.clone();
                    match blocking_with_timeout(limit, move || worker.embed(&text)).await {
                        Ok(vector) => entries.push(IndexEntry { chunk, vector }),
                        Err(Error::Embedding(reason)) => {
                            warn!(doc_id = %doc.id, chunk = %chunk.id, reason = %reason, "skipping unembeddable chunk");
                            skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Embedded { entries, skipped })
}

/// Run blocking work on the blocking pool, bounded by `limit`.
async fn blocking_with_timeout<T, F>(limit: Duration, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(Error::Embedding(format!("embedding task failed: {join}"))),
        Err(_) => Err(Error::Timeout(limit)),
    }
}

fn flatten(staging: &Staging) -> Vec<IndexEntry> {
    staging.iter().flat_map(|(_, entries)| entries.iter().cloned()).collect()
}

fn regroup(entries: Vec<IndexEntry>) -> Staging {
    let mut staging: Staging = Vec::new();
    for entry in entries {
        match staging.last_mut() {
            Some((doc, group)) if *doc == entry.chunk.doc_id => group.push(entry),
            _ => staging.push((entry.chunk.doc_id.clone(), vec![entry])),
        }
    }
    staging
}

#[derive(Clone)]
pub struct RagEngine {
    retriever: Retriever,
    staging: Arc<Mutex<Staging>>,
    embed_timeout: Duration,
    embed_batch_size: usize,
    concurrency: usize,
    system_prompt: Arc<str>,
}

impl RagEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            retriever: Retriever::new(embedder, index, RetrieverConfig::default()),
            staging: Arc::new(Mutex::new(Vec::new())),
            embed_timeout: Duration::from_secs(30),
            embed_batch_size: 32,
            concurrency: 4,
            system_prompt: Arc::from(DEFAULT_SYSTEM_PROMPT),
        }
    }

    /// Engine wired from configuration: embedder backend, index strategy,
    /// retrieval policy, timeouts and ingest concurrency.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = ragdb_embed::load_embedder(&settings.embedding)?;
        let index = ragdb_vector::index_from_settings(&settings.index);
        Ok(Self::new(embedder, index)
            .with_retriever_config(RetrieverConfig::from(&settings.retrieval))
            .with_embed_timeout(Duration::from_secs(settings.embedding.timeout_secs))
            .with_embed_batch_size(settings.embedding.batch_size)
            .with_concurrency(settings.ingest.concurrency)
            .with_system_prompt(&settings.generation.system_prompt))
    }

    pub fn with_retriever_config(mut self, config: RetrieverConfig) -> Self {
        self.retriever = Retriever::new(self.retriever.embedder().clone(), self.retriever.index().clone(), config);
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Chunks sent per embedding call. The embed timeout applies to each call.
    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Arc::from(prompt);
        self
    }

    /// A handle on the same index and documents that embeds with `embedder`.
    pub fn with_embedder(&self, embedder: Arc<dyn Embedder>) -> Self {
        let mut other = self.clone();
        other.retriever = Retriever::new(embedder, self.retriever.index().clone(), self.retriever.config());
        other
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        self.retriever.embedder()
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.retriever.index()
    }

    pub fn document_count(&self) -> usize {
        self.staging.lock().len()
    }

    fn check_header(&self) -> Result<IndexHeader> {
        let ours = self.embedder().header();
        match self.index().header() {
            Some(built) if built != ours => Err(Error::IndexVersionMismatch { expected: built, actual: ours }),
            _ => Ok(ours),
        }
    }

    /// Chunk, embed and index one plain-text document, replacing whatever
    /// that document contributed before. Returns the number of chunks indexed.
    ///
    /// Each call rebuilds the whole index (and retrains an IVF index), so
    /// loading many documents this way is quadratic. Use
    /// [`ingest_corpus`](Self::ingest_corpus) for bulk loads.
    pub async fn ingest(&self, document_id: &str, raw_text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<usize> {
        let config = ChunkingConfig::new(chunk_size, chunk_overlap)?;
        self.ingest_document(&Document::new(document_id, raw_text), &config).await
    }

    /// [`ingest`](Self::ingest) for a parsed document with its own chunking config.
    pub async fn ingest_document(&self, doc: &Document, config: &ChunkingConfig) -> Result<usize> {
        config.validate()?;
        self.check_header()?;
        let start = Instant::now();

        let embedded =
            embed_document(self.embedder().clone(), doc, *config, self.embed_batch_size, self.embed_timeout).await?;
        let count = embedded.entries.len();

        {
            let mut staging = self.staging.lock();
            let header = self.check_header()?;
            let mut next = staging.clone();
            match next.iter_mut().find(|(id, _)| *id == doc.id) {
                Some((_, slot)) => *slot = embedded.entries,
                None => next.push((doc.id.clone(), embedded.entries)),
            }
            self.index().build(header, flatten(&next))?;
            *staging = next;
        }
        info!(
            doc_id = %doc.id,
            chunks = count,
            skipped = embedded.skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document ingested"
        );
        Ok(count)
    }

    /// Rebuild the whole index from `documents`.
    ///
    /// Documents are chunked and embedded concurrently; entries are assembled
    /// in input order. A failing document is reported and left out without
    /// stopping the run. Cancelling `cancel` stops between documents with
    /// `Error::Aborted` and leaves the current index untouched. `observer`
    /// sees each outcome as it is collected.
    pub async fn ingest_corpus<F>(
        &self,
        documents: Vec<Document>,
        config: &ChunkingConfig,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(&DocumentOutcome) + Send,
    {
        config.validate()?;
        let start = Instant::now();
        let header = self.embedder().header();
        let total = documents.len();
        info!(documents = total, concurrency = self.concurrency, model = %header, "corpus ingestion started");

        let limit = self.embed_timeout;
        let batch_size = self.embed_batch_size;
        let mut results = Box::pin(futures::stream::iter(documents)
            .map(|doc| {
                let embedder = self.embedder().clone();
                let cfg = *config;
                async move {
                    let res = embed_document(embedder, &doc, cfg, batch_size, limit).await;
                    (doc.id, res)
                }
            })
            .buffered(self.concurrency));

        let mut report = IngestReport::default();
        let mut staging: Staging = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = results.next() => Some(item),
            };
            let Some(item) = next else {
                warn!(completed = report.outcomes.len(), total, "corpus ingestion aborted");
                return Err(Error::Aborted);
            };
            let Some((doc_id, res)) = item else { break };
            let status = match res {
                Ok(embedded) => {
                    let chunks = embedded.entries.len();
                    match staging.iter_mut().find(|(id, _)| *id == doc_id) {
                        Some((_, slot)) => *slot = embedded.entries,
                        None => staging.push((doc_id.clone(), embedded.entries)),
                    }
                    DocumentStatus::Indexed { chunks, skipped: embedded.skipped }
                }
                Err(e) => {
                    warn!(doc_id = %doc_id, error = %e, "document failed");
                    DocumentStatus::Failed(e)
                }
            };
            let outcome = DocumentOutcome { doc_id, status };
            observer(&outcome);
            report.outcomes.push(outcome);
        }
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        {
            let mut current = self.staging.lock();
            self.index().build(header, flatten(&staging))?;
            *current = staging;
        }
        report.total_chunks = self.index().len();
        report.elapsed = start.elapsed();
        info!(
            documents = total,
            failed = total - report.succeeded(),
            chunks = report.total_chunks,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "corpus ingestion finished"
        );
        Ok(report)
    }

    /// Retrieve and assemble context for `text`.
    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let start = Instant::now();
        let retriever = self.retriever.clone();
        let query = text.to_string();
        let (k, threshold) = (options.k, options.score_threshold);
        let result = blocking_with_timeout(self.embed_timeout, move || retriever.retrieve(&query, k, threshold)).await?;
        let context = assemble(&result, options.max_context_chars);
        let elapsed = start.elapsed();
        info!(
            k,
            hits = result.len(),
            context_chunks = context.chunks_used.len(),
            context_chars = context.text.chars().count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "query answered"
        );
        Ok(QueryResponse {
            context: context.text,
            hits: result.ranked_ids(),
            chunks: result.hits,
            context_ids: context.chunks_used,
            truncated: context.truncated,
            elapsed,
        })
    }

    /// Retrieve context for `question` and ask `generator` to answer it.
    pub async fn answer(
        &self,
        question: &str,
        options: &QueryOptions,
        generator: &dyn Generator,
        policy: &RetryPolicy,
    ) -> Result<Answer> {
        let retrieved = self.query(question, options).await?;
        let prompt = build_prompt(&self.system_prompt, &retrieved.context, question);
        let response = generate_with_retry(generator, &prompt, policy).await?;
        Ok(Answer {
            question: question.to_string(),
            response: response.trim().to_string(),
            context_ids: retrieved.context_ids,
            num_chunks_retrieved: retrieved.hits.len(),
        })
    }

    /// Persist the current index snapshot.
    pub async fn save(&self, store: &IndexStore) -> Result<StoredHeader> {
        let (header, entries) = {
            let _guard = self.staging.lock();
            let header = self.index().header().ok_or(Error::EmptyIndex)?;
            (header, self.index().entries()?)
        };
        store.save(&header, &entries).await
    }

    /// Engine over a saved snapshot. Fails with `IndexVersionMismatch` when
    /// the snapshot was built by a different model or dimensionality.
    pub async fn open(store: &IndexStore, embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let (header, entries) = store.load(Some(&embedder.header())).await?;
        let staging = regroup(entries.clone());
        index.build(header, entries)?;
        let engine = Self::new(embedder, index);
        *engine.staging.lock() = staging;
        Ok(engine)
    }

    /// Like [`RagEngine::open`], carrying over configuration from `self`.
    pub async fn reopen(&self, store: &IndexStore) -> Result<Self> {
        let mut engine = Self::open(store, self.embedder().clone(), self.index().clone()).await?;
        engine.retriever = Retriever::new(engine.embedder().clone(), engine.index().clone(), self.retriever.config());
        engine.embed_timeout = self.embed_timeout;
        engine.concurrency = self.concurrency;
        engine.system_prompt = self.system_prompt.clone();
        Ok(engine)
    }
}
