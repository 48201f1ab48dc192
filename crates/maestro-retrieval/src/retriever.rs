//! Facet retrieval: concurrent scatter/gather over the knowledge store.
//!
//! Each facet's search strategy runs as an independent branch — embed the
//! query, similarity-search with the strategy's filters, keep hits above
//! the similarity threshold up to the per-facet cap. Branches share no
//! mutable state and each carries its own timeout, so one slow facet cannot
//! block the others.
//!
//! A facet that retrieves zero chunks is valid data, not an error. A branch
//! that fails (embedding outage, store error, timeout) degrades to an empty
//! bucket; only when *every* branch fails does retrieval propagate an error
//! to the orchestrator.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use maestro_core::{
    ChatSettings, Chunk, EmbeddingBackend, Error, FacetBucket, KnowledgeStore, PlannerOutput,
    Result, SearchFilters, SearchStrategy,
};

/// Executes planner search strategies against the knowledge store.
pub struct Retriever {
    embeddings: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn KnowledgeStore>,
}

impl Retriever {
    /// Create a retriever over the given capability implementations.
    pub fn new(embeddings: Arc<dyn EmbeddingBackend>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embeddings, store }
    }

    /// Retrieve chunks for every facet in the plan, concurrently.
    ///
    /// Buckets are returned in the plan's facet order so downstream
    /// tie-breaking can rely on facet priority.
    pub async fn retrieve(
        &self,
        plan: &PlannerOutput,
        settings: &ChatSettings,
    ) -> Result<maestro_core::RetrieverOutput> {
        let start = Instant::now();
        let timeout = settings.stage_timeout();

        let branches = plan.search_strategies.iter().map(|strategy| {
            let strategy = strategy.clone();
            let filters = effective_filters(&strategy, settings);
            async move {
                let result = tokio::time::timeout(
                    timeout,
                    self.retrieve_facet(&strategy, &filters, settings),
                )
                .await;

                match result {
                    Ok(Ok(bucket)) => Ok(bucket),
                    Ok(Err(e)) => {
                        warn!(
                            facet = %strategy.facet_name,
                            error = %e,
                            "Facet retrieval failed, continuing with empty bucket"
                        );
                        Err((strategy.facet_name.clone(), e))
                    }
                    Err(_) => {
                        warn!(
                            facet = %strategy.facet_name,
                            "Facet retrieval timed out, continuing with empty bucket"
                        );
                        Err((
                            strategy.facet_name.clone(),
                            Error::Search("facet retrieval timed out".to_string()),
                        ))
                    }
                }
            }
        });

        let results = join_all(branches).await;
        let branch_count = results.len();
        let mut failed = 0usize;
        let mut buckets = Vec::with_capacity(branch_count);

        for result in results {
            match result {
                Ok(bucket) => buckets.push(bucket),
                Err((facet_name, _)) => {
                    failed += 1;
                    buckets.push(FacetBucket {
                        facet_name,
                        chunks: Vec::new(),
                        total_found: 0,
                    });
                }
            }
        }

        if branch_count > 0 && failed == branch_count {
            return Err(Error::Search(
                "retrieval failed for every facet".to_string(),
            ));
        }

        let total_chunks_retrieved = buckets.iter().map(|b| b.chunks.len()).sum();
        info!(
            facet_count = branch_count,
            chunk_count = total_chunks_retrieved,
            duration_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );

        Ok(maestro_core::RetrieverOutput {
            buckets,
            total_chunks_retrieved,
        })
    }

    /// Retrieve one facet's chunks: embed the query, search, threshold, cap.
    async fn retrieve_facet(
        &self,
        strategy: &SearchStrategy,
        filters: &SearchFilters,
        settings: &ChatSettings,
    ) -> Result<FacetBucket> {
        let vectors = self
            .embeddings
            .embed_texts(&[strategy.query.clone()])
            .await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector returned for query".to_string()))?;

        let hits = self
            .store
            .vector_search(&query_vec, filters, settings.chunks_per_facet)
            .await?;

        let total_found = hits.len();
        let chunks: Vec<Chunk> = hits
            .into_iter()
            .filter(|c| c.score >= settings.similarity_threshold)
            .take(settings.chunks_per_facet)
            .collect();

        debug!(
            facet = %strategy.facet_name,
            result_count = chunks.len(),
            total_found,
            "Facet retrieved"
        );

        Ok(FacetBucket {
            facet_name: strategy.facet_name.clone(),
            chunks,
            total_found,
        })
    }
}

/// Strategy filters win; a strategy without source-type filters inherits the
/// request-level source type restriction.
fn effective_filters(strategy: &SearchStrategy, settings: &ChatSettings) -> SearchFilters {
    let mut filters = strategy.filters.clone();
    if filters.source_types.is_empty() {
        filters.source_types = settings.source_types.clone();
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_core::{Facet, QuestionType, Vector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::InMemoryKnowledgeStore;
    use maestro_inference::mock::MockEmbeddingBackend;

    fn plan_with_facets(names: &[&str]) -> PlannerOutput {
        PlannerOutput {
            intent: "test".to_string(),
            question_type: QuestionType::Technical,
            facets: names
                .iter()
                .map(|n| Facet {
                    name: n.to_string(),
                    description: format!("{n} facet"),
                    query_hint: n.to_string(),
                    tags: vec![],
                    priority: 3,
                })
                .collect(),
            search_strategies: names
                .iter()
                .map(|n| SearchStrategy {
                    facet_name: n.to_string(),
                    query: n.to_string(),
                    filters: SearchFilters::default(),
                })
                .collect(),
        }
    }

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_id: format!("src-{id}"),
            source_type: "lesson".to_string(),
            title: format!("Title {id}"),
            content: format!("content {id}"),
            category: None,
            score: 0.0,
        }
    }

    async fn seeded_store(texts: &[(&str, &str)]) -> Arc<InMemoryKnowledgeStore> {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        for (id, text) in texts {
            let mut c = chunk(id);
            c.content = text.to_string();
            store
                .add(c, MockEmbeddingBackend::generate(text, 128))
                .await;
        }
        store
    }

    fn low_threshold_settings() -> ChatSettings {
        ChatSettings {
            similarity_threshold: 0.1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_buckets_preserve_facet_order() {
        let store = seeded_store(&[("1", "alpha content"), ("2", "beta content")]).await;
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["beta content", "alpha content", "gamma"]);
        let out = retriever
            .retrieve(&plan, &low_threshold_settings())
            .await
            .unwrap();

        let order: Vec<_> = out.buckets.iter().map(|b| b.facet_name.as_str()).collect();
        assert_eq!(order, vec!["beta content", "alpha content", "gamma"]);
    }

    #[tokio::test]
    async fn test_zero_chunk_facet_is_valid() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["anything"]);
        let out = retriever
            .retrieve(&plan, &low_threshold_settings())
            .await
            .unwrap();

        assert_eq!(out.buckets.len(), 1);
        assert!(out.buckets[0].chunks.is_empty());
        assert_eq!(out.total_chunks_retrieved, 0);
    }

    #[tokio::test]
    async fn test_similarity_threshold_filters_hits() {
        let store = seeded_store(&[("1", "identical text"), ("2", "zebra")]).await;
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["identical text"]);
        let settings = ChatSettings {
            similarity_threshold: 0.99,
            ..Default::default()
        };
        let out = retriever.retrieve(&plan, &settings).await.unwrap();

        // Only the identical chunk passes a 0.99 threshold
        assert_eq!(out.buckets[0].chunks.len(), 1);
        assert_eq!(out.buckets[0].chunks[0].id, "1");
        // total_found still counts pre-threshold hits
        assert_eq!(out.buckets[0].total_found, 2);
    }

    #[tokio::test]
    async fn test_chunks_per_facet_cap() {
        let texts: Vec<(String, String)> = (0..10)
            .map(|i| (i.to_string(), format!("shared topic {i}")))
            .collect();
        let store = Arc::new(InMemoryKnowledgeStore::new());
        for (id, text) in &texts {
            let mut c = chunk(id);
            c.content = text.clone();
            store.add(c, MockEmbeddingBackend::generate(text, 128)).await;
        }
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["shared topic"]);
        let settings = ChatSettings {
            chunks_per_facet: 3,
            similarity_threshold: 0.0,
            ..Default::default()
        };
        let out = retriever.retrieve(&plan, &settings).await.unwrap();
        assert_eq!(out.buckets[0].chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades_to_error() {
        let store = seeded_store(&[("1", "content")]).await;
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        embeddings.set_fail_all(true);
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["a", "b"]);
        let result = retriever.retrieve(&plan, &low_threshold_settings()).await;
        assert!(matches!(result, Err(Error::Search(_))));
    }

    /// Store that fails for a specific facet query marker.
    struct FlakyStore {
        inner: Arc<InMemoryKnowledgeStore>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeStore for FlakyStore {
        async fn vector_search(
            &self,
            vector: &Vector,
            filters: &SearchFilters,
            k: usize,
        ) -> Result<Vec<Chunk>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err(Error::Search("shard down".to_string()));
            }
            self.inner.vector_search(vector, filters, k).await
        }
    }

    #[tokio::test]
    async fn test_partial_outage_yields_empty_bucket_not_error() {
        let inner = seeded_store(&[("1", "beta content")]).await;
        let store = Arc::new(FlakyStore {
            inner,
            calls: AtomicUsize::new(0),
        });
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["alpha", "beta content"]);
        let out = retriever
            .retrieve(&plan, &low_threshold_settings())
            .await
            .unwrap();

        // First branch failed → empty bucket; second succeeded
        assert_eq!(out.buckets.len(), 2);
        let empty: usize = out.buckets.iter().filter(|b| b.chunks.is_empty()).count();
        assert_eq!(empty, 1);
        assert!(out.total_chunks_retrieved >= 1);
    }

    /// Store whose first search hangs forever.
    struct HangingFirstStore {
        inner: Arc<InMemoryKnowledgeStore>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeStore for HangingFirstStore {
        async fn vector_search(
            &self,
            vector: &Vector,
            filters: &SearchFilters,
            k: usize,
        ) -> Result<Vec<Chunk>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            self.inner.vector_search(vector, filters, k).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_facet_times_out_without_blocking_others() {
        let inner = seeded_store(&[("1", "beta content")]).await;
        let store = Arc::new(HangingFirstStore {
            inner,
            calls: AtomicUsize::new(0),
        });
        let embeddings = Arc::new(MockEmbeddingBackend::new(128));
        let retriever = Retriever::new(embeddings, store);

        let plan = plan_with_facets(&["alpha", "beta content"]);
        let settings = ChatSettings {
            similarity_threshold: 0.1,
            stage_timeout_secs: 1,
            ..Default::default()
        };
        let out = retriever.retrieve(&plan, &settings).await.unwrap();

        // The hung branch degraded to an empty bucket; the other completed
        assert_eq!(out.buckets.len(), 2);
        assert!(out.buckets[0].chunks.is_empty());
        assert_eq!(out.buckets[1].chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_strategy_filters_inherit_settings_source_types() {
        let strategy = SearchStrategy {
            facet_name: "f".into(),
            query: "q".into(),
            filters: SearchFilters::default(),
        };
        let settings = ChatSettings {
            source_types: vec!["course".to_string()],
            ..Default::default()
        };
        let filters = effective_filters(&strategy, &settings);
        assert_eq!(filters.source_types, vec!["course".to_string()]);

        // Explicit strategy filters win
        let strategy = SearchStrategy {
            facet_name: "f".into(),
            query: "q".into(),
            filters: SearchFilters {
                source_types: vec!["note".to_string()],
                categories: vec![],
            },
        };
        let filters = effective_filters(&strategy, &settings);
        assert_eq!(filters.source_types, vec!["note".to_string()]);
    }
}
