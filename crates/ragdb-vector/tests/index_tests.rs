use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ragdb_core::{Chunk, Embedder, Error, IndexEntry, IndexHeader, VectorIndex};
use ragdb_embed::HashEmbedder;
use ragdb_vector::{compute_nlist, recall_at_k, FlatIndex, IvfIndex, IvfParams};

fn entry(doc: &str, ordinal: usize, vector: Vec<f32>) -> IndexEntry {
    let chunk = Chunk {
        id: Chunk::make_id(doc, ordinal),
        doc_id: doc.to_string(),
        ordinal,
        start: ordinal * 10,
        end: ordinal * 10 + 10,
        text: format!("{doc} chunk {ordinal}"),
        label: None,
    };
    IndexEntry { chunk, vector }
}

fn header(dim: usize) -> IndexHeader {
    IndexHeader::new("test-model", dim)
}

fn ids(hits: &[ragdb_core::SearchHit]) -> Vec<String> {
    hits.iter().map(|h| h.chunk.id.clone()).collect()
}

#[test]
fn search_before_build_is_empty_index_error() {
    let index = FlatIndex::new();
    assert!(matches!(index.search(&[1.0, 0.0], 3), Err(Error::EmptyIndex)));
    assert!(index.header().is_none());
    assert!(index.is_empty());
}

#[test]
fn flat_ranks_by_cosine_descending() {
    let index = FlatIndex::new();
    index
        .build(
            header(2),
            vec![entry("d", 0, vec![1.0, 0.0]), entry("d", 1, vec![0.0, 1.0]), entry("d", 2, vec![3.0, 3.0])],
        )
        .unwrap();
    let hits = index.search(&[2.0, 0.0], 3).unwrap();
    assert_eq!(ids(&hits), vec!["d:0", "d:2", "d:1"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    assert!(hits[2].score.abs() < 1e-6);
}

#[test]
fn ties_break_by_ordinal_then_document() {
    let index = FlatIndex::new();
    index
        .build(
            header(2),
            vec![entry("b", 1, vec![1.0, 0.0]), entry("c", 0, vec![1.0, 0.0]), entry("a", 0, vec![5.0, 0.0])],
        )
        .unwrap();
    let hits = index.search(&[1.0, 0.0], 3).unwrap();
    assert_eq!(ids(&hits), vec!["a:0", "c:0", "b:1"]);
}

#[test]
fn k_bounds_result_length() {
    let index = FlatIndex::new();
    index.build(header(2), vec![entry("d", 0, vec![1.0, 0.0]), entry("d", 1, vec![0.0, 1.0])]).unwrap();
    assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    assert_eq!(index.search(&[1.0, 0.0], 1).unwrap().len(), 1);
    assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 2);
}

#[test]
fn built_but_empty_index_returns_no_hits() {
    let index = FlatIndex::new();
    index.build(header(4), vec![]).unwrap();
    assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    assert_eq!(index.header(), Some(header(4)));
}

#[test]
fn query_dimension_is_checked() {
    let index = FlatIndex::new();
    index.build(header(3), vec![entry("d", 0, vec![1.0, 0.0, 0.0])]).unwrap();
    let err = index.search(&[1.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }), "{err}");
}

#[test]
fn rejected_build_keeps_previous_snapshot() {
    let index = FlatIndex::new();
    index.build(header(2), vec![entry("d", 0, vec![1.0, 0.0])]).unwrap();

    let dup = vec![entry("x", 0, vec![1.0, 0.0]), entry("x", 0, vec![0.0, 1.0])];
    assert!(matches!(index.build(header(2), dup), Err(Error::InvalidIndexEntry(_))));

    let wrong_dim = vec![entry("y", 0, vec![1.0, 0.0, 0.0])];
    assert!(matches!(index.build(header(2), wrong_dim), Err(Error::DimensionMismatch { .. })));

    let nan = vec![entry("z", 0, vec![f32::NAN, 0.0])];
    assert!(matches!(index.build(header(2), nan), Err(Error::InvalidIndexEntry(_))));

    assert_eq!(ids(&index.search(&[1.0, 0.0], 5).unwrap()), vec!["d:0"]);
}

#[test]
fn zero_vectors_score_zero_instead_of_nan() {
    let index = FlatIndex::new();
    index.build(header(2), vec![entry("d", 0, vec![0.0, 0.0]), entry("d", 1, vec![0.0, 1.0])]).unwrap();
    let hits = index.search(&[0.0, 0.0], 2).unwrap();
    assert!(hits.iter().all(|h| h.score == 0.0));
}

#[test]
fn repeated_searches_are_identical() {
    let embedder = HashEmbedder::new(128);
    let texts = ["prime the pump", "check the oil", "replace the filter", "drain the tank"];
    let entries = texts
        .iter()
        .enumerate()
        .map(|(i, t)| entry("manual", i, embedder.embed(t).unwrap()))
        .collect();
    let index = FlatIndex::new();
    index.build(embedder.header(), entries).unwrap();
    let q = embedder.embed("how to prime a pump").unwrap();
    let first = index.search(&q, 4).unwrap();
    for _ in 0..5 {
        let again = index.search(&q, 4).unwrap();
        assert_eq!(ids(&again), ids(&first));
    }
    assert_eq!(first[0].chunk.id, "manual:0");
}

#[test]
fn readers_see_whole_snapshots_during_rebuilds() {
    let index = Arc::new(FlatIndex::new());
    let snap = |doc: &str, n: usize| -> Vec<IndexEntry> { (0..n).map(|i| entry(doc, i, vec![1.0, i as f32])).collect() };
    index.build(header(2), snap("a", 4)).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                let entries = if flip { snap("a", 4) } else { snap("b", 6) };
                index.build(header(2), entries).unwrap();
                flip = !flip;
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..500 {
                    let hits = index.search(&[1.0, 1.0], 10).unwrap();
                    let doc = hits[0].chunk.doc_id.clone();
                    assert!(hits.iter().all(|h| h.chunk.doc_id == doc), "mixed snapshot");
                    assert_eq!(hits.len(), if doc == "a" { 4 } else { 6 });
                }
            })
        })
        .collect();
    for r in readers {
        r.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

fn random_unit(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / n).collect()
}

fn clustered(rng: &mut StdRng, clusters: usize, per_cluster: usize, dim: usize) -> (Vec<Vec<f32>>, Vec<IndexEntry>) {
    let centers: Vec<Vec<f32>> = (0..clusters).map(|_| random_unit(rng, dim)).collect();
    let mut entries = Vec::new();
    for (c, center) in centers.iter().enumerate() {
        for i in 0..per_cluster {
            let v = center.iter().map(|x| x + rng.gen_range(-0.05f32..0.05)).collect();
            entries.push(entry(&format!("c{c}"), i, v));
        }
    }
    (centers, entries)
}

#[test]
fn ivf_recall_matches_flat_on_clustered_data() {
    let mut rng = StdRng::seed_from_u64(7);
    let dim = 32;
    let (centers, entries) = clustered(&mut rng, 8, 40, dim);

    let exact = FlatIndex::new();
    exact.build(header(dim), entries.clone()).unwrap();
    let approx = IvfIndex::new(IvfParams { nlist: Some(8), nprobe: 2, ..IvfParams::default() });
    approx.build(header(dim), entries).unwrap();

    let queries: Vec<Vec<f32>> = centers
        .iter()
        .map(|c| c.iter().map(|x| x + rng.gen_range(-0.02f32..0.02)).collect())
        .collect();
    let recall = recall_at_k(&approx, &exact, &queries, 10).unwrap();
    assert!(recall >= 0.95, "recall@10 = {recall}");
}

#[test]
fn ivf_probing_every_list_is_exact() {
    let mut rng = StdRng::seed_from_u64(11);
    let (_, entries) = clustered(&mut rng, 4, 10, 8);
    let exact = FlatIndex::new();
    exact.build(header(8), entries.clone()).unwrap();
    let approx = IvfIndex::new(IvfParams { nlist: Some(4), nprobe: 4, ..IvfParams::default() });
    approx.build(header(8), entries).unwrap();

    let q = random_unit(&mut rng, 8);
    let a = approx.search(&q, 7).unwrap();
    let e = exact.search(&q, 7).unwrap();
    assert_eq!(ids(&a), ids(&e));
}

#[test]
fn ivf_shares_empty_and_dimension_errors() {
    let index = IvfIndex::new(IvfParams::default());
    assert!(matches!(index.search(&[1.0], 1), Err(Error::EmptyIndex)));
    index.build(header(2), vec![]).unwrap();
    assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
    index.build(header(2), vec![entry("d", 0, vec![1.0, 0.0])]).unwrap();
    assert!(matches!(index.search(&[1.0], 1), Err(Error::DimensionMismatch { .. })));
}

#[test]
fn nlist_grows_with_sqrt_of_corpus() {
    assert_eq!(compute_nlist(0), 1);
    assert_eq!(compute_nlist(1), 1);
    assert_eq!(compute_nlist(100), 10);
    assert_eq!(compute_nlist(10_000), 100);
}
