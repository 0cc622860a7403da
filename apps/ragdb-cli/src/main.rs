use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ragdb_core::config::{Config, Settings};
use ragdb_core::corpus::CorpusLoader;
use ragdb_core::{Embedder, Error};
use ragdb_rag::{DocumentStatus, GeminiGenerator, QueryOptions, RagEngine, RetryPolicy};
use ragdb_vector::IndexStore;

#[derive(Parser)]
#[command(name = "ragdb", version, about = "Retrieval-augmented answering over a local text corpus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index every .txt file of the corpus directory
    Ingest {
        /// Corpus directory (defaults to data.corpus_dir)
        dir: Option<PathBuf>,
        /// Only ingest the first N files
        #[arg(long)]
        limit: Option<usize>,
        /// Replace a saved index built with a different embedding model
        #[arg(long)]
        reset: bool,
    },
    /// Show the ranked chunks and assembled context for a query
    Query {
        text: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Answer a question with the generation service
    Ask {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
}

#[derive(Args)]
struct RetrievalArgs {
    #[arg(short, long)]
    k: Option<usize>,
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long)]
    max_context_chars: Option<usize>,
}

impl RetrievalArgs {
    fn options(&self, settings: &Settings) -> QueryOptions {
        let mut opts = QueryOptions::from(&settings.retrieval);
        if let Some(k) = self.k {
            opts.k = k;
        }
        if let Some(t) = self.threshold {
            opts.score_threshold = t;
        }
        if let Some(m) = self.max_context_chars {
            opts.max_context_chars = m;
        }
        opts
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Config::load()
        .map_err(|e| {
            eprintln!("Error loading config: {e}");
            e
        })?
        .settings()?;

    match cli.command {
        Command::Ingest { dir, limit, reset } => ingest(&settings, dir, limit, reset).await,
        Command::Query { text, retrieval } => query(&settings, &text, &retrieval.options(&settings)).await,
        Command::Ask { question, retrieval } => ask(&settings, &question, &retrieval.options(&settings)).await,
    }
}

async fn ingest(settings: &Settings, dir: Option<PathBuf>, limit: Option<usize>, reset: bool) -> anyhow::Result<()> {
    let data_dir = dir.unwrap_or_else(|| settings.data.corpus_dir());
    println!("ragdb ingest\n============");
    println!("Data directory: {}", data_dir.display());

    let mut loader = CorpusLoader::new();
    if let Some(limit) = limit {
        println!("🔢 Limiting ingestion to {limit} files");
        loader = loader.with_limit(limit);
    }
    let documents = loader.load_directory(&data_dir)?;
    if documents.is_empty() {
        println!("No documents to ingest");
        return Ok(());
    }

    let engine = RagEngine::from_settings(settings)?;
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupted, stopping after the current document");
            on_ctrl_c.cancel();
        }
    });

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let report = engine
        .ingest_corpus(documents, &settings.chunking, &cancel, |outcome| {
            pb.inc(1);
            pb.set_message(outcome.doc_id.clone());
        })
        .await;
    let report = match report {
        Ok(report) => report,
        Err(Error::Aborted) => {
            pb.abandon_with_message("aborted, saved index left unchanged");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    pb.finish_with_message("✅ ingestion completed!");

    for outcome in report.failed() {
        if let DocumentStatus::Failed(e) = &outcome.status {
            println!("❌ {}: {e}", outcome.doc_id);
        }
    }

    let store = IndexStore::open(&settings.data.index_dir()).await?;
    if reset {
        if let Some(old) = store.header().await? {
            if old.index_header() != engine.embedder().header() {
                println!("♻️  Replacing index built with {}", old.index_header());
                store.reset().await?;
            }
        }
    }
    let stored = engine
        .save(&store)
        .await
        .with_context(|| format!("saving index to {} (use --reset to switch models)", store.root().display()))?;

    println!("\n📊 Indexed {} chunks from {} documents", stored.entry_count, report.succeeded());
    println!("💾 Index saved to {}", store.root().display());
    println!("\n💡 To search, use: ragdb query '<text>'");
    Ok(())
}

async fn open_engine(settings: &Settings) -> anyhow::Result<RagEngine> {
    let store = IndexStore::open(&settings.data.index_dir()).await?;
    let engine = RagEngine::from_settings(settings)?;
    engine
        .reopen(&store)
        .await
        .with_context(|| format!("opening index at {} (run `ragdb ingest` first)", store.root().display()))
}

async fn query(settings: &Settings, text: &str, opts: &QueryOptions) -> anyhow::Result<()> {
    let engine = open_engine(settings).await?;
    let response = engine.query(text, opts).await?;
    println!("🔍 Found {} results for: \"{}\" in {:?}", response.hits.len(), text, response.elapsed);
    for (i, hit) in response.chunks.iter().enumerate() {
        let label = hit.chunk.label.as_deref().unwrap_or("-");
        println!("\n  {}. score={:.4}  id={}  label={}", i + 1, hit.score, hit.chunk.id, label);
        println!("     📝 {}", hit.chunk.text.replace('\n', " "));
    }
    if response.truncated {
        println!("\n⚠️  Context truncated to {} chunks", response.context_ids.len());
    }
    println!("\n--- context ({} chars) ---\n{}", response.context.chars().count(), response.context);
    Ok(())
}

async fn ask(settings: &Settings, question: &str, opts: &QueryOptions) -> anyhow::Result<()> {
    let engine = open_engine(settings).await?;
    let generator = GeminiGenerator::from_settings(&settings.generation)?;
    let policy = RetryPolicy::from(&settings.generation);
    let answer = engine.answer(question, opts, &generator, &policy).await?;
    println!("❓ {}", answer.question);
    println!("\n{}", answer.response);
    println!("\n📚 {} chunks retrieved: {}", answer.num_chunks_retrieved, answer.context_ids.join(", "));
    Ok(())
}
