use std::fs;
use tempfile::TempDir;

use ragserve_core::chunker::{estimate_tokens, Chunker, ChunkingConfig};
use ragserve_core::error::Error;

#[test]
fn chunk_text_small_input_single_chunk() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk_text("cats are mammals", "facts").expect("chunk");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].id, "facts:0");
    assert_eq!(chunks[0].text, "cats are mammals");
    assert_eq!(chunks[0].total_chunks, 1);
}

#[test]
fn chunk_text_windows_have_no_overlap() {
    let cfg = ChunkingConfig { chunk_chars: 10, max_chunks_per_doc: 200, max_text_chars: 200_000 };
    let chunker = Chunker::new(cfg);
    let text = "abcdefghijklmnopqrstuvwxyz";
    let chunks = chunker.chunk_text(text, "alpha").expect("chunk");

    // Reassembling the windows must give back the input exactly.
    let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(rejoined, text);
    assert_eq!(chunks.len(), 3);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.chunk_index, i);
        assert_eq!(c.total_chunks, 3);
    }
}

#[test]
fn chunk_text_respects_char_boundaries() {
    let cfg = ChunkingConfig { chunk_chars: 2, max_chunks_per_doc: 200, max_text_chars: 200_000 };
    let chunker = Chunker::new(cfg);
    // Multi-byte chars: a naive byte split would panic.
    let chunks = chunker.chunk_text("日本語のテキスト", "jp").expect("chunk");
    let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(rejoined, "日本語のテキスト");
}

#[test]
fn chunk_text_rejects_oversized_input() {
    let cfg = ChunkingConfig { chunk_chars: 800, max_chunks_per_doc: 200, max_text_chars: 100 };
    let chunker = Chunker::new(cfg);
    let big = "word ".repeat(200);
    let err = chunker.chunk_text(&big, "big").expect_err("must reject");
    assert!(matches!(err, Error::Operation(_)), "got {err:?}");
}

#[test]
fn chunk_text_caps_chunks_per_doc() {
    let cfg = ChunkingConfig { chunk_chars: 1, max_chunks_per_doc: 5, max_text_chars: 200_000 };
    let chunker = Chunker::new(cfg);
    let chunks = chunker.chunk_text("abcdefghij", "caps").expect("chunk");
    assert_eq!(chunks.len(), 5);
}

#[test]
fn process_directory_reads_txt_and_md() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").expect("write");
    fs::write(dir.join("b.md"), "charlie delta").expect("write");
    fs::write(dir.join("c.bin"), "ignored").expect("write");

    let chunker = Chunker::default();
    let chunks = chunker.process_directory(dir).expect("process");

    let mut sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    assert_eq!(sources, vec!["a", "b"]);
}

#[test]
fn process_directory_limited_takes_first_files() {
    let tmp = TempDir::new().expect("tempdir");
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").expect("write");
    fs::write(dir.join("b.txt"), "charlie delta").expect("write");

    let chunker = Chunker::default();
    let chunks = chunker.process_directory_limited(dir, 1).expect("process limited");

    let mut sources = std::collections::HashSet::new();
    for c in &chunks {
        sources.insert(c.source.clone());
    }
    assert_eq!(sources.len(), 1, "limited to one source document");
}

#[test]
fn estimate_tokens_scales_with_words() {
    assert_eq!(estimate_tokens(""), 0);
    // 3 words / 0.75 = 4 tokens
    assert_eq!(estimate_tokens("one two three"), 4);
    assert!(estimate_tokens(&"word ".repeat(75)) >= 100);
}
