//! In-memory knowledge store.
//!
//! Brute-force cosine search over seeded chunks, with source-type and
//! category filters. Backs the test suites and the demo binary; production
//! deployments implement [`KnowledgeStore`] over the platform's document
//! store instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use maestro_core::{Chunk, KnowledgeStore, Result, SearchFilters, Vector};

/// A chunk plus its stored embedding.
#[derive(Debug, Clone)]
struct StoredChunk {
    chunk: Chunk,
    vector: Vector,
}

/// Brute-force in-memory [`KnowledgeStore`].
#[derive(Clone, Default)]
pub struct InMemoryKnowledgeStore {
    chunks: Arc<RwLock<Vec<StoredChunk>>>,
}

impl InMemoryKnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk with its embedding. The chunk's `score` field is ignored
    /// at insert time and recomputed per query.
    pub async fn add(&self, chunk: Chunk, vector: Vector) {
        self.chunks.write().await.push(StoredChunk { chunk, vector });
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// True when the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

fn passes_filters(chunk: &Chunk, filters: &SearchFilters) -> bool {
    if !filters.source_types.is_empty() && !filters.source_types.contains(&chunk.source_type) {
        return false;
    }
    if !filters.categories.is_empty() {
        match &chunk.category {
            Some(category) => {
                if !filters.categories.contains(category) {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn vector_search(
        &self,
        vector: &Vector,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().await;

        let mut hits: Vec<Chunk> = chunks
            .iter()
            .filter(|stored| passes_filters(&stored.chunk, filters))
            .map(|stored| {
                let mut chunk = stored.chunk.clone();
                chunk.score = cosine(vector, &stored.vector);
                chunk
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}
