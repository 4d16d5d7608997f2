//! The serving-side vector index.
//!
//! Documents are persisted in LanceDB by the indexer; at process start the
//! whole table is scanned into an immutable in-memory `VectorIndex` doing
//! brute-force inner product over L2-normalized vectors (cosine). Loading
//! completes-or-fails atomically: readers only ever observe a fully built
//! index through `IndexSlot`, never a partial one.

pub mod schema;
pub mod store;
pub mod writer;

pub use writer::DocumentWriter;

use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, StringArray};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::sync::{Arc, PoisonError, RwLock};

use ragserve_core::error::{Error, Result};
use ragserve_core::traits::VectorSearcher;
use ragserve_core::types::SearchHit;

use crate::schema::EMBEDDING_DIM;
use crate::store::{META_EMBEDDER_ID, META_METRIC, META_TABLE, METRIC_INNER_PRODUCT};

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
}

pub struct VectorIndex {
    dim: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index directly from entries, validating dimensionality.
    pub fn from_entries(dim: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        for entry in &entries {
            if entry.vector.len() != dim {
                return Err(Error::Operation(format!(
                    "entry {} has {} dims, index expects {}",
                    entry.id,
                    entry.vector.len(),
                    dim
                )));
            }
        }
        Ok(Self { dim, entries })
    }

    /// Scan the persisted `documents` table into memory.
    ///
    /// Any malformed row fails the whole load. When `expect_embedder_id` is
    /// given it is checked against the id recorded at build time: a corpus
    /// embedded by a different model must not serve, because build and query
    /// would disagree on the embedding space.
    pub async fn load(
        conn: &Connection,
        table: &str,
        expect_embedder_id: Option<&str>,
    ) -> Result<Self> {
        let op_err = |e: anyhow::Error| Error::Operation(e.to_string());

        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        if !names.contains(&table.to_string()) {
            return Err(Error::NotFound(format!("table '{table}' does not exist; run the indexer first")));
        }

        if let Some(expected) = expect_embedder_id {
            match store::get_meta(conn, META_TABLE, META_EMBEDDER_ID).await.map_err(op_err)? {
                Some(stored) if stored != expected => {
                    return Err(Error::InvalidConfig(format!(
                        "index was built with embedder '{stored}' but serving with '{expected}'"
                    )));
                }
                _ => {}
            }
        }
        if let Some(metric) = store::get_meta(conn, META_TABLE, META_METRIC).await.map_err(op_err)? {
            if metric != METRIC_INNER_PRODUCT {
                return Err(Error::InvalidConfig(format!(
                    "index metric '{metric}' is not supported by this build"
                )));
            }
        }

        let dim = EMBEDDING_DIM as usize;
        let t = conn
            .open_table(table)
            .execute()
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        let mut stream = t
            .query()
            .execute()
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| Error::Operation(e.to_string()))?
        {
            let id_col = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| Error::Operation("id column missing".to_string()))?;
            let source_col = batch
                .column_by_name("source")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| Error::Operation("source column missing".to_string()))?;
            let text_col = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| Error::Operation("text column missing".to_string()))?;
            let vec_col = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| Error::Operation("vector column missing".to_string()))?;

            for i in 0..batch.num_rows() {
                let list = vec_col.value(i);
                let vector: Vec<f32> = list
                    .as_primitive::<arrow_array::types::Float32Type>()
                    .values()
                    .iter()
                    .copied()
                    .collect();
                if vector.len() != dim {
                    return Err(Error::Operation(format!(
                        "row '{}' has a {}-dim vector, expected {}",
                        id_col.value(i),
                        vector.len(),
                        dim
                    )));
                }
                entries.push(IndexEntry {
                    id: id_col.value(i).to_string(),
                    source: source_col.value(i).to_string(),
                    text: text_col.value(i).to_string(),
                    vector,
                });
            }
        }

        tracing::info!(documents = entries.len(), dim, "vector index loaded");
        Ok(Self { dim, entries })
    }

    /// Top-k by descending inner product. Vectors are normalized at embed
    /// time, so this is cosine similarity. The sort is stable: equal scores
    /// keep their stored order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_vec.len() != self.dim {
            return Err(Error::Operation(format!(
                "query vector has {} dims, index expects {}",
                query_vec.len(),
                self.dim
            )));
        }
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                id: entry.id.clone(),
                score: dot(query_vec, &entry.vector),
                source: entry.source.clone(),
                text: entry.text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Init-before-serve barrier for the process-wide index singleton.
///
/// The slot starts empty; `install` publishes a fully built index in one
/// step. Queries against an empty slot get `Error::IndexNotLoaded`, which a
/// caller may retry once startup has finished.
#[derive(Default)]
pub struct IndexSlot {
    inner: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn install(&self, index: VectorIndex) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(index));
    }

    pub fn get(&self) -> Result<Arc<VectorIndex>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.clone().ok_or(Error::IndexNotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn document_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |idx| idx.len())
    }
}

impl VectorSearcher for IndexSlot {
    fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.get()?.search(query_vec, k)
    }
}
