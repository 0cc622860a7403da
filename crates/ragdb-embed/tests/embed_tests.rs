use proptest::prelude::*;

use ragdb_core::config::EmbeddingSettings;
use ragdb_core::{Embedder, Error};
use ragdb_embed::{load_embedder, HashEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(256);
    let v1 = embedder.embed("hello world").expect("embed");
    let v2 = HashEmbedder::new(256).embed("hello world").expect("embed");

    assert_eq!(v1.len(), 256);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(v1, v2, "same text and model produce identical vectors");
    assert_eq!(embedder.model_id(), "hash-xx64:d256");
}

#[test]
fn empty_or_blank_input_is_an_embedding_error() {
    let embedder = HashEmbedder::new(32);
    for text in ["", "   ", "\n\t"] {
        assert!(matches!(embedder.embed(text), Err(Error::Embedding(_))), "{text:?}");
    }
}

#[test]
fn shared_words_score_higher_than_unrelated_text() {
    let embedder = HashEmbedder::new(512);
    let doc = embedder.embed("The water pump must be primed before use.").unwrap();
    let related = embedder.embed("how do I prime the pump").unwrap();
    let unrelated = embedder.embed("quarterly revenue forecast").unwrap();
    assert!(cosine(&doc, &related) > cosine(&doc, &unrelated));
}

#[test]
fn tokens_ignore_case_and_edge_punctuation() {
    let embedder = HashEmbedder::new(128);
    assert_eq!(embedder.embed("Pump!").unwrap(), embedder.embed("pump").unwrap());
}

#[test]
fn load_embedder_builds_hash_backend_from_settings() {
    let settings = EmbeddingSettings { dim: 64, ..EmbeddingSettings::default() };
    let embedder = load_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 64);
    assert_eq!(embedder.header().dim, 64);
}

#[test]
fn batch_fails_when_any_input_is_blank() {
    let embedder = HashEmbedder::new(32);
    let texts = vec!["fine".to_string(), " ".to_string()];
    assert!(matches!(embedder.embed_batch(&texts), Err(Error::Embedding(_))));
}

proptest! {
    #[test]
    fn batch_matches_elementwise_embed(texts in proptest::collection::vec("[a-zA-Z ]{1,40}[a-z]", 0..12)) {
        let embedder = HashEmbedder::new(64);
        let batch = embedder.embed_batch(&texts).unwrap();
        prop_assert_eq!(batch.len(), texts.len());
        for (text, vector) in texts.iter().zip(&batch) {
            prop_assert_eq!(vector, &embedder.embed(text).unwrap());
        }
    }
}
