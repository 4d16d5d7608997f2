use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::DocumentChunk;

/// Limits for corpus ingestion. Windows are fixed-size with no overlap and
/// capped per document; oversized inputs are rejected outright instead of
/// being silently clipped.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub max_chunks_per_doc: usize,
    pub max_text_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_chars: 800, max_chunks_per_doc: 200, max_text_chars: 200_000 }
    }
}

#[derive(Default)]
pub struct Chunker {
    cfg: ChunkingConfig,
}

impl Chunker {
    pub fn new(cfg: ChunkingConfig) -> Self {
        Self { cfg }
    }

    /// Split one document into fixed-size chunks.
    ///
    /// Window boundaries land on char boundaries, never inside a multi-byte
    /// sequence. Returns `Error::Operation` when the text exceeds the hard
    /// size cap.
    pub fn chunk_text(&self, text: &str, source: &str) -> crate::error::Result<Vec<DocumentChunk>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }

        let char_count = text.chars().count();
        if char_count > self.cfg.max_text_chars {
            return Err(Error::Operation(format!(
                "text too large ({} chars, maximum {}); ingest smaller sections",
                char_count, self.cfg.max_text_chars
            )));
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < text.len() && chunks.len() < self.cfg.max_chunks_per_doc {
            let end = match text[start..].char_indices().nth(self.cfg.chunk_chars) {
                Some((offset, _)) => start + offset,
                None => text.len(),
            };
            let chunk_index = chunks.len();
            chunks.push(DocumentChunk {
                id: format!("{}:{}", source, chunk_index),
                source: source.to_string(),
                text: text[start..end].to_string(),
                chunk_index,
                total_chunks: 0,
            });
            start = end;
        }

        let total_chunks = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total_chunks;
        }
        Ok(chunks)
    }

    /// Walk a corpus directory and chunk every `.txt`/`.md` file found.
    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<DocumentChunk>> {
        let files = self.list_corpus_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no corpus files found");
            return Ok(vec![]);
        }
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            tracing::info!(
                file = %file_path.display(),
                "processing file {}/{}",
                file_index + 1,
                files.len()
            );
            let content = self.read_file_content(file_path)?;
            let source = extract_source(file_path);
            let chunks = self.chunk_text(&content, &source)?;
            all_chunks.extend(chunks);
        }
        tracing::info!(files = files.len(), chunks = all_chunks.len(), "corpus processed");
        Ok(all_chunks)
    }

    /// Same as `process_directory` but only the first `limit` files.
    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<DocumentChunk>> {
        let mut files = self.list_corpus_files(data_dir);
        if files.len() > limit {
            files.truncate(limit);
            tracing::info!(limit, "limited to first {} files", limit);
        }
        let mut all_chunks = Vec::new();
        for file_path in &files {
            let content = self.read_file_content(file_path)?;
            let source = extract_source(file_path);
            all_chunks.extend(self.chunk_text(&content, &source)?);
        }
        Ok(all_chunks)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn list_corpus_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            match path.extension().and_then(|s| s.to_str()) {
                Some("txt") | Some("md") => files.push(path.to_path_buf()),
                _ => {}
            }
        }
        files.sort();
        files
    }
}

fn extract_source(file_path: &Path) -> String {
    file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rough token count used for prompt budgeting (~0.75 words per token).
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75) as usize
}
