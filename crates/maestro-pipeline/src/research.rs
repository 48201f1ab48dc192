//! Web research stage: per-facet live search run alongside retrieval.
//!
//! When enabled, each facet's query hint goes to the web search capability
//! concurrently with knowledge-store retrieval. Results are labelled
//! context for the final writer and corroborating evidence for the fact
//! verifier — they are never citation sources, because citations may only
//! reference retrieved chunks.
//!
//! Research is fully degradable: a failed or slow branch yields an empty
//! result set for that facet and the pipeline moves on.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{info, warn};

use maestro_core::{ChatSettings, Facet, WebSearch, WebSnippet};

/// Per-facet web research results.
#[derive(Debug, Clone, Default)]
pub struct ResearchOutput {
    pub by_facet: Vec<FacetResearch>,
    pub total_results: usize,
}

/// Web results gathered for one facet.
#[derive(Debug, Clone)]
pub struct FacetResearch {
    pub facet_name: String,
    pub results: Vec<WebSnippet>,
}

/// Runs per-facet web searches.
pub struct WebResearcher {
    web: Arc<dyn WebSearch>,
}

impl WebResearcher {
    /// Create a researcher over the given search capability.
    pub fn new(web: Arc<dyn WebSearch>) -> Self {
        Self { web }
    }

    /// Search the web for every facet, concurrently. Infallible by design.
    pub async fn research(&self, facets: &[Facet], settings: &ChatSettings) -> ResearchOutput {
        let start = Instant::now();
        let timeout = settings.stage_timeout();

        let branches = facets.iter().map(|facet| {
            let facet_name = facet.name.clone();
            let query = facet.query_hint.clone();
            async move {
                let result = tokio::time::timeout(
                    timeout,
                    self.web.search(&query, settings.web_search_max_results),
                )
                .await;

                let results = match result {
                    Ok(Ok(snippets)) => snippets,
                    Ok(Err(e)) => {
                        warn!(facet = %facet_name, error = %e, "Web research failed for facet");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(facet = %facet_name, "Web research timed out for facet");
                        Vec::new()
                    }
                };
                FacetResearch {
                    facet_name,
                    results,
                }
            }
        });

        let by_facet: Vec<FacetResearch> = join_all(branches).await;
        let total_results = by_facet.iter().map(|f| f.results.len()).sum();

        info!(
            facet_count = by_facet.len(),
            result_count = total_results,
            duration_ms = start.elapsed().as_millis() as u64,
            "Web research complete"
        );

        ResearchOutput {
            by_facet,
            total_results,
        }
    }
}
