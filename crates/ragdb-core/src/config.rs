//! Configuration loader, typed settings, and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nesting, e.g. `APP_RETRIEVAL__K=8`). Typed [`Settings`] are
//! extracted on top of their serialized defaults, so every key is optional.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        tracing::debug!(env = %env_name, "configuration sources merged");

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the typed settings, filling gaps with defaults.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub ingest: IngestSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if self.index.nprobe == 0 {
            return Err(Error::InvalidConfig("index.nprobe must be positive".into()));
        }
        if self.retrieval.overfetch_factor == 0 {
            return Err(Error::InvalidConfig("retrieval.overfetch_factor must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.score_threshold must lie in [-1, 1], got {}",
                self.retrieval.score_threshold
            )));
        }
        if self.retrieval.max_chunks_per_doc == Some(0) {
            return Err(Error::InvalidConfig("retrieval.max_chunks_per_doc must be at least 1".into()));
        }
        if self.generation.max_attempts == 0 {
            return Err(Error::InvalidConfig("generation.max_attempts must be at least 1".into()));
        }
        if self.ingest.concurrency == 0 {
            return Err(Error::InvalidConfig("ingest.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub corpus_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { corpus_dir: "data/txt".into(), index_dir: "data/index".into() }
    }
}

impl DataSettings {
    pub fn corpus_dir(&self) -> PathBuf {
        expand_path(&self.corpus_dir)
    }

    pub fn index_dir(&self) -> PathBuf {
        expand_path(&self.index_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    #[default]
    Hash,
    BgeM3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Output size of the hash backend; BGE-M3 always yields 1024.
    pub dim: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
    /// Chunks per embedding call; `timeout_secs` bounds each call.
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Hash, dim: 384, model_dir: None, max_len: 256, batch_size: 32, timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    Flat,
    Ivf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub kind: IndexKind,
    /// Cluster count for `ivf`; derived from the corpus size when unset.
    pub nlist: Option<usize>,
    pub nprobe: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { kind: IndexKind::Flat, nlist: None, nprobe: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub score_threshold: f32,
    pub max_context_chars: usize,
    pub overfetch_factor: usize,
    pub max_chunks_per_doc: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { k: 5, score_threshold: 0.0, max_context_chars: 4000, overfetch_factor: 2, max_chunks_per_doc: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub system_prompt: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-1.5-flash".into(),
            api_key: None,
            max_tokens: 1000,
            temperature: 0.7,
            timeout_secs: 30,
            max_attempts: 3,
            backoff_ms: 500,
            system_prompt: "You are a helpful assistant. Use the following context to answer the user's question. \
                            If the answer is not in the context, say so."
                .into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub concurrency: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
