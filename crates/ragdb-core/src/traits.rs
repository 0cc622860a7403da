use crate::error::Result;
use crate::types::{IndexEntry, IndexHeader, SearchHit};

pub trait Embedder: Send + Sync {
    /// Stable identifier for the model and its configuration.
    fn model_id(&self) -> &str;
    /// Output dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum input length in tokens; longer inputs are truncated.
    fn max_len(&self) -> usize;
    /// Embed one text. Fails with `Error::Embedding` when the input is empty
    /// after trimming.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts. Output order follows input order and every vector is
    /// identical to what `embed` returns for the same text.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn header(&self) -> IndexHeader {
        IndexHeader::new(self.model_id(), self.dim())
    }
}

/// Nearest-neighbour index over chunk embeddings, ranked by cosine similarity.
///
/// Implementations swap whole snapshots on `build`: a concurrent `search`
/// sees either the previous contents or the new ones.
pub trait VectorIndex: Send + Sync {
    fn build(&self, header: IndexHeader, entries: Vec<IndexEntry>) -> Result<()>;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    /// Header of the current snapshot; `None` before the first build.
    fn header(&self) -> Option<IndexHeader>;
    fn len(&self) -> usize;
    /// Copy of every entry in the current snapshot, in build order.
    fn entries(&self) -> Result<Vec<IndexEntry>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
