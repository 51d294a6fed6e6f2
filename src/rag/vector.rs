//! Vector index over the policy corpus
//!
//! Documents are split into overlapping chunks, embedded once and persisted
//! with bincode. The persisted index is reused only while its fingerprint
//! (embedding model plus document texts) matches the current corpus.

use super::embeddings::EmbeddingProvider;
use super::RetrievedSnippet;
use crate::errors::{ModelError, ModelResult, SerializationError};
use crate::models::PolicyDocument;
use chrono::{DateTime, Utc};
use lru::LruCache;
use ndarray::ArrayView1;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const INDEX_FILE: &str = "index.bin";
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    document_id: String,
    chunk_index: usize,
    text: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    fingerprint: String,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// SHA-256 over the embedding model name and every document text
pub fn corpus_fingerprint(model: &str, documents: &[PolicyDocument]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    for doc in documents {
        hasher.update([0u8]);
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Split text into chunks of at most `size` characters with `overlap`
/// characters shared between neighbours, cutting on whitespace where possible
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size / 2);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(ws) = (start + size / 2..end).rev().find(|i| chars[*i].is_whitespace()) {
                end = ws;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end >= chars.len() {
            break;
        }

        let mut next = end.saturating_sub(overlap).max(start + 1);
        while next < end && !chars[next - 1].is_whitespace() {
            next += 1;
        }
        start = next;
    }

    chunks
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm == 0.0 {
        1.0
    } else {
        1.0 - a.dot(&b) / norm
    }
}

pub struct VectorManager {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    index_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    index: RwLock<Option<Arc<VectorIndex>>>,
    query_cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl VectorManager {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        index_dir: impl AsRef<Path>,
        chunk_size: usize,
        chunk_overlap: usize,
        query_cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(query_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            index_dir: index_dir.as_ref().to_path_buf(),
            chunk_size,
            chunk_overlap,
            index: RwLock::new(None),
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.index.read().as_ref().is_some_and(|idx| !idx.is_empty())
    }

    pub fn index_size(&self) -> usize {
        self.index.read().as_ref().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().clone()
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE)
    }

    /// Load the persisted index when it matches the corpus, otherwise build it
    pub async fn initialize(&self, documents: &[PolicyDocument]) -> ModelResult<()> {
        let provider = self.provider()?;
        let fingerprint = corpus_fingerprint(provider.model_name(), documents);

        match self.load_persisted().await {
            Ok(index) if index.fingerprint == fingerprint && index.model == provider.model_name() => {
                tracing::info!(
                    entries = index.len(),
                    path = %self.index_path().display(),
                    "Loaded persisted vector index"
                );
                *self.index.write() = Some(Arc::new(index));
                return Ok(());
            }
            Ok(_) => tracing::info!("Persisted vector index is stale, rebuilding"),
            Err(e) => tracing::debug!(error = %e, "No usable persisted vector index"),
        }

        self.rebuild(documents).await
    }

    /// Embed every chunk and replace the in-memory and persisted index
    pub async fn rebuild(&self, documents: &[PolicyDocument]) -> ModelResult<()> {
        let provider = self.provider()?;
        let perf = crate::logging::PerformanceLogger::start("vector_index_build");

        let mut pending: Vec<(String, usize, String)> = Vec::new();
        for doc in documents {
            for (i, chunk) in chunk_text(&doc.text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                pending.push((doc.id.clone(), i, chunk));
            }
        }

        let mut entries = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|(_, _, text)| text.clone()).collect();
            let embeddings = provider.embed_batch(&texts).await?;
            for ((document_id, chunk_index, text), embedding) in batch.iter().cloned().zip(embeddings) {
                entries.push(IndexEntry {
                    document_id,
                    chunk_index,
                    text,
                    embedding,
                });
            }
        }

        if entries.is_empty() {
            return Err(ModelError::IndexFailed {
                reason: "no chunks to index".to_string(),
            });
        }

        let dimensions = entries[0].embedding.len();
        if entries.iter().any(|e| e.embedding.len() != dimensions) {
            return Err(ModelError::IndexFailed {
                reason: "embeddings have inconsistent dimensions".to_string(),
            });
        }

        let index = VectorIndex {
            model: provider.model_name().to_string(),
            dimensions,
            fingerprint: corpus_fingerprint(provider.model_name(), documents),
            built_at: Utc::now(),
            entries,
        };

        if let Err(e) = self.persist(&index).await {
            tracing::warn!(error = %e, "Failed to persist vector index, keeping it in memory");
        }

        tracing::info!(
            documents = documents.len(),
            chunks = index.len(),
            dimensions = dimensions,
            "Vector index built"
        );
        perf.finish();

        *self.index.write() = Some(Arc::new(index));
        self.query_cache.lock().clear();
        Ok(())
    }

    /// Up to `k` chunks ordered by cosine distance, ties in index order
    pub async fn similarity_search(&self, query: &str, k: usize) -> ModelResult<Vec<RetrievedSnippet>> {
        let index = self.current_index().ok_or_else(|| ModelError::IndexFailed {
            reason: "vector index not loaded".to_string(),
        })?;
        let query_embedding = self.query_embedding(query).await?;

        if query_embedding.len() != index.dimensions {
            return Err(ModelError::IndexFailed {
                reason: format!(
                    "query dimension {} does not match index dimension {}",
                    query_embedding.len(),
                    index.dimensions
                ),
            });
        }

        let mut scored: Vec<(usize, f32)> = index
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_distance(&e.embedding, &query_embedding)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| {
                let entry = &index.entries[i];
                RetrievedSnippet {
                    document_id: entry.document_id.clone(),
                    text: entry.text.clone(),
                    distance: Some(distance),
                }
            })
            .collect())
    }

    pub fn clear(&self) {
        *self.index.write() = None;
        self.query_cache.lock().clear();
    }

    fn provider(&self) -> ModelResult<&Arc<dyn EmbeddingProvider>> {
        self.provider.as_ref().ok_or_else(|| ModelError::NotConfigured {
            backend: "embeddings".to_string(),
        })
    }

    async fn query_embedding(&self, query: &str) -> ModelResult<Arc<Vec<f32>>> {
        let cached = self.query_cache.lock().get(query).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let embedding = Arc::new(self.provider()?.embed(query).await?);
        self.query_cache
            .lock()
            .put(query.to_string(), Arc::clone(&embedding));
        Ok(embedding)
    }

    async fn load_persisted(&self) -> Result<VectorIndex, SerializationError> {
        let bytes = tokio::fs::read(self.index_path())
            .await
            .map_err(|e| SerializationError::BinaryFailed {
                format: "bincode".to_string(),
                reason: e.to_string(),
            })?;
        Ok(bincode::deserialize(&bytes)?)
    }

    async fn persist(&self, index: &VectorIndex) -> Result<(), SerializationError> {
        let bytes = bincode::serialize(index)?;
        let io_err = |e: std::io::Error| SerializationError::BinaryFailed {
            format: "bincode".to_string(),
            reason: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.index_dir).await.map_err(io_err)?;
        tokio::fs::write(self.index_path(), bytes).await.map_err(io_err)?;
        Ok(())
    }
}
