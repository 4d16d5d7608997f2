use ragserve_core::error::Error;
use ragserve_core::traits::{Embedder, VectorSearcher};
use ragserve_core::types::DocumentChunk;
use ragserve_embed::FakeEmbedder;
use ragserve_index::store::DOCUMENTS_TABLE;
use ragserve_index::{DocumentWriter, IndexEntry, IndexSlot, VectorIndex};

fn chunk(id: &str, source: &str, text: &str) -> DocumentChunk {
    DocumentChunk {
        id: id.to_string(),
        source: source.to_string(),
        text: text.to_string(),
        chunk_index: 0,
        total_chunks: 1,
    }
}

#[tokio::test]
async fn write_then_load_then_search() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = FakeEmbedder::default();
    let chunks = vec![
        chunk("d1:0", "d1", "cats are mammals"),
        chunk("d2:0", "d2", "rockets use propellant"),
        chunk("d3:0", "d3", "bread needs yeast to rise"),
    ];

    let writer = DocumentWriter::new(tmp.path(), DOCUMENTS_TABLE).await?;
    let written = writer.index_chunks(&chunks, &embedder).await?;
    assert_eq!(written, 3);

    let conn = ragserve_index::store::open_db(&tmp.path().to_string_lossy()).await?;
    let index = VectorIndex::load(&conn, DOCUMENTS_TABLE, Some(embedder.id())).await?;
    assert_eq!(index.len(), 3);

    // Retrieval scenario: the cats query must hit d1, not d2.
    let q = embedder.embed_batch(&["tell me about cats".to_string()])?.remove(0);
    let hits = index.search(&q, 1)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "d1:0");

    // Bounded length and non-increasing scores.
    let hits = index.search(&q, 10)?;
    assert!(hits.len() <= 3);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score, "scores must be non-increasing");
    }
    Ok(())
}

#[tokio::test]
async fn self_retrieval_returns_own_document_first() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = FakeEmbedder::default();
    let texts = [
        "cats are mammals",
        "rockets use propellant",
        "the harvest moon rises in autumn",
        "compilers translate source code",
    ];
    let chunks: Vec<DocumentChunk> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| chunk(&format!("doc{i}:0"), &format!("doc{i}"), t))
        .collect();

    let writer = DocumentWriter::new(tmp.path(), DOCUMENTS_TABLE).await?;
    writer.index_chunks(&chunks, &embedder).await?;
    let conn = ragserve_index::store::open_db(&tmp.path().to_string_lossy()).await?;
    let index = VectorIndex::load(&conn, DOCUMENTS_TABLE, Some(embedder.id())).await?;

    for c in &chunks {
        let q = embedder.embed_batch(&[c.text.clone()])?.remove(0);
        let hits = index.search(&q, 1)?;
        assert_eq!(hits[0].id, c.id, "querying with a document's own text must return it");
    }
    Ok(())
}

#[tokio::test]
async fn load_rejects_mismatched_embedder() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = FakeEmbedder::default();
    let writer = DocumentWriter::new(tmp.path(), DOCUMENTS_TABLE).await?;
    writer.index_chunks(&[chunk("a:0", "a", "some text")], &embedder).await?;

    let conn = ragserve_index::store::open_db(&tmp.path().to_string_lossy()).await?;
    let err = VectorIndex::load(&conn, DOCUMENTS_TABLE, Some("local:bge-m3:d1024"))
        .await
        .expect_err("embedder mismatch must fail the load");
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn load_missing_table_is_not_found() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = ragserve_index::store::open_db(&tmp.path().to_string_lossy()).await?;
    let err = VectorIndex::load(&conn, DOCUMENTS_TABLE, None)
        .await
        .expect_err("missing table must fail");
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    Ok(())
}

#[test]
fn slot_is_the_init_barrier() {
    let slot = IndexSlot::empty();
    assert!(!slot.is_loaded());
    let err = slot.get().expect_err("empty slot must refuse queries");
    assert!(matches!(err, Error::IndexNotLoaded));
    let err = VectorSearcher::search(&slot, &[0.0; 4], 1).expect_err("search before install");
    assert!(matches!(err, Error::IndexNotLoaded));

    let entries = vec![IndexEntry {
        id: "x:0".to_string(),
        source: "x".to_string(),
        text: "hello".to_string(),
        vector: vec![1.0, 0.0, 0.0, 0.0],
    }];
    let index = VectorIndex::from_entries(4, entries).expect("build");
    slot.install(index);
    assert!(slot.is_loaded());
    assert_eq!(slot.document_count(), 1);
    let hits = VectorSearcher::search(&slot, &[1.0, 0.0, 0.0, 0.0], 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn from_entries_validates_dimensions() {
    let entries = vec![IndexEntry {
        id: "bad:0".to_string(),
        source: "bad".to_string(),
        text: "short vector".to_string(),
        vector: vec![1.0, 2.0],
    }];
    let err = VectorIndex::from_entries(4, entries).expect_err("dim mismatch");
    assert!(matches!(err, Error::Operation(_)));
}

#[test]
fn search_ties_keep_stored_order() {
    let mk = |id: &str, v: Vec<f32>| IndexEntry {
        id: id.to_string(),
        source: id.to_string(),
        text: String::new(),
        vector: v,
    };
    // Two entries identical to the query, one orthogonal.
    let index = VectorIndex::from_entries(
        2,
        vec![mk("first", vec![1.0, 0.0]), mk("second", vec![1.0, 0.0]), mk("other", vec![0.0, 1.0])],
    )
    .expect("build");
    let hits = index.search(&[1.0, 0.0], 3).expect("search");
    assert_eq!(hits[0].id, "first");
    assert_eq!(hits[1].id, "second");
    assert_eq!(hits[2].id, "other");
}
