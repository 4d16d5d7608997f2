use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;

use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use std::path::Path;
use std::sync::Arc;

use crate::schema::{build_documents_schema, EMBEDDING_DIM};
use crate::store::{self, META_EMBEDDER_ID, META_METRIC, META_TABLE, METRIC_INNER_PRODUCT};
use ragserve_core::traits::Embedder;
use ragserve_core::types::DocumentChunk;

/// Writes embedded chunks into the LanceDB `documents` table and records
/// build metadata. Used by the indexer binary, never by the serving path.
pub struct DocumentWriter {
    db: Connection,
    table_name: String,
}

impl DocumentWriter {
    pub async fn new(db_path: &Path, table_name: &str) -> Result<Self> {
        let db = store::open_db(db_path.to_string_lossy().as_ref()).await?;
        Ok(Self { db, table_name: table_name.to_string() })
    }

    /// Embed every chunk and persist it, then stamp the meta table with the
    /// embedder id and metric so load-time consistency checks can run.
    pub async fn index_chunks(
        &self,
        chunks: &[DocumentChunk],
        embedder: &dyn Embedder,
    ) -> Result<usize> {
        if chunks.is_empty() {
            println!("No chunks to index");
            return Ok(0);
        }
        println!("Indexing {} chunks into table: {}", chunks.len(), self.table_name);
        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
                .expect("static template")
                .progress_chars("#>-"),
        );

        let batch_size = 1000usize;
        let mut processed = 0usize;
        let mut batch: Vec<(DocumentChunk, Vec<f32>)> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let embedding = embedder
                .embed_batch(std::slice::from_ref(&chunk.text))
                .map_err(|e| anyhow::anyhow!("embedding chunk {}: {e}", chunk.id))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for {}", chunk.id))?;
            batch.push((chunk.clone(), embedding));
            processed += 1;
            pb.set_position(processed as u64);
            if batch.len() >= batch_size || i == chunks.len() - 1 {
                self.insert_batch(&batch).await?;
                batch.clear();
            }
        }
        pb.finish_with_message("✅ indexing completed");

        store::set_meta(&self.db, META_TABLE, META_EMBEDDER_ID, embedder.id()).await?;
        store::set_meta(&self.db, META_TABLE, META_METRIC, METRIC_INNER_PRODUCT).await?;
        println!("📊 Indexed {} chunks (embedder: {})", processed, embedder.id());
        Ok(processed)
    }

    async fn insert_batch(&self, rows: &[(DocumentChunk, Vec<f32>)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let record_batch = rows_to_record_batch(rows)?;
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
        if self.db.table_names().execute().await?.contains(&self.table_name) {
            self.db
                .open_table(&self.table_name)
                .execute()
                .await?
                .add(reader)
                .execute()
                .await?;
        } else {
            self.db.create_table(&self.table_name, reader).execute().await?;
        }
        Ok(())
    }
}

fn rows_to_record_batch(rows: &[(DocumentChunk, Vec<f32>)]) -> Result<RecordBatch> {
    let schema = build_documents_schema();
    let mut ids = Vec::new();
    let mut sources = Vec::new();
    let mut texts = Vec::new();
    let mut chunk_indices = Vec::new();
    let mut totals = Vec::new();
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for (chunk, vector) in rows {
        anyhow::ensure!(
            vector.len() == EMBEDDING_DIM as usize,
            "vector for {} has {} dims, expected {}",
            chunk.id,
            vector.len(),
            EMBEDDING_DIM
        );
        ids.push(chunk.id.clone());
        sources.push(chunk.source.clone());
        texts.push(chunk.text.clone());
        chunk_indices.push(chunk.chunk_index as i32);
        totals.push(chunk.total_chunks as i32);
        vectors.push(Some(vector.iter().map(|&x| Some(x)).collect()));
    }
    let record_batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(texts)),
            Arc::new(Int32Array::from(chunk_indices)),
            Arc::new(Int32Array::from(totals)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                vectors.into_iter(),
                EMBEDDING_DIM,
            )),
        ],
    )?;
    Ok(record_batch)
}
