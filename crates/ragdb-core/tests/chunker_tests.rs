use proptest::prelude::*;

use ragdb_core::chunker::{chunk_document, BoundaryPolicy, Chunker, ChunkingConfig};
use ragdb_core::types::{Chunk, Document, Section};
use ragdb_core::Error;

fn spans(chunks: &[Chunk]) -> Vec<(usize, usize)> {
    chunks.iter().map(|c| (c.start, c.end)).collect()
}

/// Stitch chunks back together, dropping the overlapped prefix of each.
fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for c in chunks {
        assert!(c.start <= covered, "gap before chunk {}", c.id);
        out.extend(c.text.chars().skip(covered - c.start));
        covered = c.end;
    }
    out
}

#[test]
fn short_document_splits_on_fixed_grid() {
    let doc = Document::new("letters", "AAAA BBBB CCCC DDDD");
    let chunks = chunk_document(&doc, ChunkingConfig::new(10, 4).unwrap()).unwrap();
    assert_eq!(spans(&chunks), vec![(0, 10), (6, 16), (12, 19)]);
    assert_eq!(chunks[0].text, "AAAA BBBB ");
    assert_eq!(chunks[1].text, "BBB CCCC D");
    assert_eq!(chunks[2].text, "CC DDDD");
    assert_eq!(chunks[2].id, "letters:2");
    assert_eq!(reconstruct(&chunks), doc.text);
}

#[test]
fn empty_text_yields_no_chunks() {
    let chunker = Chunker::new(ChunkingConfig::new(10, 4).unwrap()).unwrap();
    assert_eq!(chunker.chunk_text("empty", "").count(), 0);
}

#[test]
fn invalid_configs_are_rejected_up_front() {
    for (size, overlap) in [(0, 0), (10, 10), (10, 11)] {
        let err = ChunkingConfig::new(size, overlap).unwrap_err();
        assert!(matches!(err, Error::InvalidChunkConfig(_)), "size={size} overlap={overlap}: {err}");
    }
    let bad = ChunkingConfig { chunk_size: 4, chunk_overlap: 4, boundary: BoundaryPolicy::Exact };
    assert!(matches!(Chunker::new(bad), Err(Error::InvalidChunkConfig(_))));
}

#[test]
fn text_shorter_than_chunk_is_one_chunk() {
    let chunker = Chunker::new(ChunkingConfig::new(100, 10).unwrap()).unwrap();
    let chunks: Vec<Chunk> = chunker.chunk_text("tiny", "hello").collect();
    assert_eq!(spans(&chunks), vec![(0, 5)]);
}

#[test]
fn no_trailing_chunk_inside_previous_overlap() {
    // 16 chars: the second chunk already reaches the end.
    let chunker = Chunker::new(ChunkingConfig::new(10, 4).unwrap()).unwrap();
    let chunks: Vec<Chunk> = chunker.chunk_text("d", "0123456789abcdef").collect();
    assert_eq!(spans(&chunks), vec![(0, 10), (6, 16)]);
}

#[test]
fn iteration_is_restartable_and_clonable() {
    let doc = Document::new("d", "one two three four five six seven eight nine ten");
    let chunker = Chunker::new(ChunkingConfig::new(12, 3).unwrap()).unwrap();
    let first: Vec<Chunk> = chunker.chunks(&doc).collect();
    let second: Vec<Chunk> = chunker.chunks(&doc).collect();
    assert_eq!(first, second);

    let mut iter = chunker.chunks(&doc);
    iter.next();
    let rest_a: Vec<Chunk> = iter.clone().collect();
    let rest_b: Vec<Chunk> = iter.collect();
    assert_eq!(rest_a, rest_b);
    assert_eq!(rest_a, first[1..].to_vec());
}

#[test]
fn offsets_count_characters_not_bytes() {
    let doc = Document::new("u", "héllo wörld ünïcode");
    let chunks = chunk_document(&doc, ChunkingConfig::new(8, 2).unwrap()).unwrap();
    assert_eq!(chunks[0].text, "héllo wö");
    assert_eq!(chunks[1].start, 6);
    assert!(chunks.iter().all(|c| c.text.chars().count() == c.char_len()));
    assert_eq!(reconstruct(&chunks), doc.text);
}

#[test]
fn chunks_inherit_section_labels() {
    let doc = Document::from_pages("manual", ["first page text", "second page text"]);
    let chunks = chunk_document(&doc, ChunkingConfig::new(10, 2).unwrap()).unwrap();
    assert_eq!(chunks[0].label.as_deref(), Some("page 1"));
    assert_eq!(chunks.last().unwrap().label.as_deref(), Some("page 2"));

    let unlabelled = Document::new("plain", "no sections here").with_sections(Vec::<Section>::new());
    let chunks = chunk_document(&unlabelled, ChunkingConfig::new(5, 1).unwrap()).unwrap();
    assert!(chunks.iter().all(|c| c.label.is_none()));
}

#[test]
fn whitespace_policy_ends_chunks_after_breaks() {
    let doc = Document::new("fox", "the quick brown fox jumps over the lazy dog");
    let config = ChunkingConfig::new(12, 3).unwrap().with_boundary(BoundaryPolicy::Whitespace);
    let chunks = chunk_document(&doc, config).unwrap();
    assert_eq!(chunks[0].text, "the quick ");
    assert_eq!((chunks[1].start, chunks[1].end), (7, 16));
    for c in &chunks[..chunks.len() - 1] {
        assert!(c.text.ends_with(' '), "chunk {:?} should end at whitespace", c.text);
    }
    assert_eq!(reconstruct(&chunks), doc.text);
}

#[test]
fn whitespace_policy_falls_back_to_hard_cut() {
    let doc = Document::new("solid", "abcdefghijklmnopqrstuvwxyz");
    let config = ChunkingConfig::new(10, 4).unwrap().with_boundary(BoundaryPolicy::Whitespace);
    let chunks = chunk_document(&doc, config).unwrap();
    assert_eq!(spans(&chunks), vec![(0, 10), (6, 16), (12, 22), (18, 26)]);
}

#[test]
fn whitespace_policy_honours_sentence_breaks() {
    let doc = Document::new("s", "Stop.Go now. Then wait");
    let config = ChunkingConfig::new(14, 2).unwrap().with_boundary(BoundaryPolicy::Whitespace);
    let chunks = chunk_document(&doc, config).unwrap();
    // "Stop." is not followed by whitespace, "now." is.
    assert_eq!(chunks[0].text, "Stop.Go now. ");
}

proptest! {
    #[test]
    fn exact_chunks_follow_grid_and_reconstruct(
        text in "[a-zé .!\n]{0,200}",
        size in 1usize..40,
        overlap_seed in 0usize..40,
    ) {
        let overlap = overlap_seed % size;
        let doc = Document::new("p", text.clone());
        let chunks = chunk_document(&doc, ChunkingConfig::new(size, overlap).unwrap()).unwrap();

        prop_assert_eq!(reconstruct(&chunks), text.clone());
        for (i, c) in chunks.iter().enumerate() {
            prop_assert_eq!(c.start, i * (size - overlap));
            prop_assert!(c.char_len() <= size);
            prop_assert_eq!(c.ordinal, i);
        }
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end - pair[1].start, overlap);
        }
        if text.is_empty() {
            prop_assert!(chunks.is_empty());
        }
    }

    #[test]
    fn whitespace_chunks_overlap_exactly_and_reconstruct(
        text in "[a-z .!\n]{0,200}",
        size in 1usize..40,
        overlap_seed in 0usize..40,
    ) {
        let overlap = overlap_seed % size;
        let doc = Document::new("p", text.clone());
        let config = ChunkingConfig::new(size, overlap).unwrap().with_boundary(BoundaryPolicy::Whitespace);
        let chunks = chunk_document(&doc, config).unwrap();

        prop_assert_eq!(reconstruct(&chunks), text);
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end - pair[1].start, overlap);
            prop_assert!(pair[1].start > pair[0].start);
        }
        prop_assert!(chunks.iter().all(|c| c.char_len() <= size));
    }
}
