//! Fact verifier stage: cross-check claims against live web search.
//!
//! Takes the leading idea's outline points plus the summaries' key points
//! as claims (bounded), searches the web for each, and asks a model whether
//! the snippets support the claim. Verification is strictly advisory: a
//! dead search capability or gateway yields `overall_confidence = None`
//! ("unknown") and the pipeline writes the answer anyway. Unsupported
//! claims are flagged for the writer, never suppressed.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, FactVerificationOutput, GenerationRequest, Idea,
    ModelGateway, Stage, Summary, VerifiedClaim, WebSearch,
};

/// Verifies claims against live web search.
pub struct FactVerifier {
    gateway: Arc<dyn ModelGateway>,
    web: Arc<dyn WebSearch>,
}

#[derive(Debug, Default, Deserialize)]
struct RawJudgment {
    #[serde(default)]
    supported: bool,
    #[serde(default)]
    evidence_url: Option<String>,
}

impl FactVerifier {
    /// Create a verifier over the given capabilities.
    pub fn new(gateway: Arc<dyn ModelGateway>, web: Arc<dyn WebSearch>) -> Self {
        Self { gateway, web }
    }

    /// Verify the leading idea's claims. Never fails; degraded operation
    /// reports `overall_confidence = None`.
    pub async fn verify(
        &self,
        idea: &Idea,
        summaries: &[Summary],
        settings: &ChatSettings,
    ) -> FactVerificationOutput {
        let start = Instant::now();
        let claims = collect_claims(idea, summaries);
        if claims.is_empty() {
            return FactVerificationOutput::default();
        }

        let mut verified = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for claim in &claims {
            attempted += 1;
            match self.verify_claim(claim, settings).await {
                Some(result) => verified.push(result),
                None => failed += 1,
            }
        }

        let overall_confidence = if verified.is_empty() {
            // Every check failed: verification was unavailable, not negative.
            None
        } else {
            let supported = verified.iter().filter(|c| c.supported).count();
            Some(supported as f32 / verified.len() as f32)
        };

        info!(
            result_count = verified.len(),
            failed,
            attempted,
            confidence = ?overall_confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fact verification complete"
        );

        FactVerificationOutput {
            claims: verified,
            overall_confidence,
        }
    }

    /// Check one claim. `None` when the check itself could not run.
    async fn verify_claim(&self, claim: &str, settings: &ChatSettings) -> Option<VerifiedClaim> {
        let snippets = match self
            .web
            .search(claim, settings.web_search_max_results)
            .await
        {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(error = %e, "Web search failed for claim, skipping");
                return None;
            }
        };

        if snippets.is_empty() {
            debug!(claim, "No web evidence found");
            return Some(VerifiedClaim {
                text: claim.to_string(),
                supported: false,
                evidence_url: None,
            });
        }

        let evidence_block: String = snippets
            .iter()
            .map(|s| {
                let excerpt: String = s.content.chars().take(500).collect();
                format!("{} ({})\n{}", s.title, s.url, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = "You check whether web evidence supports a claim. \
Respond with JSON: {\"supported\": bool, \"evidence_url\": \"url of the best source or null\"}. \
Only mark supported when the evidence actually backs the claim.";
        let prompt = format!("Claim: {claim}\n\nEvidence:\n{evidence_block}");

        let request = GenerationRequest::new(
            settings.model_for(Stage::FactVerifier),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(defaults::STRUCTURED_TEMPERATURE)
        .with_max_tokens(500);

        match self.gateway.call(request).await {
            Ok(response) => {
                let judgment: RawJudgment =
                    guard::parse_or_default(&response.content, RawJudgment::default());
                // The model can only point at URLs the search returned.
                let evidence_url = judgment
                    .evidence_url
                    .filter(|url| snippets.iter().any(|s| &s.url == url));
                Some(VerifiedClaim {
                    text: claim.to_string(),
                    supported: judgment.supported,
                    evidence_url,
                })
            }
            Err(e) => {
                warn!(error = %e, "Judgment call failed for claim, skipping");
                None
            }
        }
    }
}

/// Claims worth checking: outline points first, then summary key points.
fn collect_claims(idea: &Idea, summaries: &[Summary]) -> Vec<String> {
    idea.outline
        .iter()
        .chain(summaries.iter().flat_map(|s| s.key_points.iter()))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .take(defaults::MAX_CLAIMS_TO_VERIFY)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use maestro_core::{Error, IdeaConfidence, Result, WebSnippet};
    use maestro_inference::mock::MockGateway;
    use std::sync::Mutex;

    struct ScriptedWeb {
        results: Vec<WebSnippet>,
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedWeb {
        fn with_results(results: Vec<WebSnippet>) -> Self {
            Self {
                results,
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                results: vec![],
                fail: true,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WebSearch for ScriptedWeb {
        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<WebSnippet>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(Error::Request("network down".to_string()));
            }
            Ok(self.results.clone())
        }
    }

    fn snippet(url: &str) -> WebSnippet {
        WebSnippet {
            title: "Result".to_string(),
            url: url.to_string(),
            content: "evidence text".to_string(),
            score: 0.9,
        }
    }

    fn idea_with_outline(points: &[&str]) -> Idea {
        Idea {
            angle: "angle".to_string(),
            outline: points.iter().map(|s| s.to_string()).collect(),
            supporting_facets: vec![],
            confidence: IdeaConfidence::Supported,
        }
    }

    #[tokio::test]
    async fn test_supported_claim_with_evidence_url() {
        let gateway = MockGateway::new().with_default_response(
            r#"{"supported": true, "evidence_url": "https://example.com/a"}"#,
        );
        let web = Arc::new(ScriptedWeb::with_results(vec![snippet(
            "https://example.com/a",
        )]));
        let verifier = FactVerifier::new(Arc::new(gateway), web);

        let out = verifier
            .verify(
                &idea_with_outline(&["compressors reduce dynamic range"]),
                &[],
                &ChatSettings::default(),
            )
            .await;

        assert_eq!(out.claims.len(), 1);
        assert!(out.claims[0].supported);
        assert_eq!(
            out.claims[0].evidence_url.as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(out.overall_confidence, Some(1.0));
    }

    #[tokio::test]
    async fn test_fabricated_evidence_url_is_dropped() {
        let gateway = MockGateway::new().with_default_response(
            r#"{"supported": true, "evidence_url": "https://invented.example/nope"}"#,
        );
        let web = Arc::new(ScriptedWeb::with_results(vec![snippet(
            "https://example.com/a",
        )]));
        let verifier = FactVerifier::new(Arc::new(gateway), web);

        let out = verifier
            .verify(
                &idea_with_outline(&["a claim"]),
                &[],
                &ChatSettings::default(),
            )
            .await;
        assert!(out.claims[0].evidence_url.is_none());
    }

    #[tokio::test]
    async fn test_web_outage_reports_unknown_confidence() {
        let gateway = MockGateway::new().with_default_response(r#"{"supported": true}"#);
        let web = Arc::new(ScriptedWeb::failing());
        let verifier = FactVerifier::new(Arc::new(gateway.clone()), web);

        let out = verifier
            .verify(
                &idea_with_outline(&["claim one", "claim two"]),
                &[],
                &ChatSettings::default(),
            )
            .await;

        assert!(out.claims.is_empty());
        assert_eq!(out.overall_confidence, None);
        // No judgment calls without evidence
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_evidence_marks_unsupported_without_model_call() {
        let gateway = MockGateway::new().with_default_response(r#"{"supported": true}"#);
        let web = Arc::new(ScriptedWeb::with_results(vec![]));
        let verifier = FactVerifier::new(Arc::new(gateway.clone()), web);

        let out = verifier
            .verify(
                &idea_with_outline(&["obscure claim"]),
                &[],
                &ChatSettings::default(),
            )
            .await;

        assert_eq!(out.claims.len(), 1);
        assert!(!out.claims[0].supported);
        assert_eq!(out.overall_confidence, Some(0.0));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_claims_bounded() {
        let many: Vec<String> = (0..30).map(|i| format!("claim {i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let gateway = MockGateway::new().with_default_response(r#"{"supported": false}"#);
        let web = Arc::new(ScriptedWeb::with_results(vec![]));
        let verifier = FactVerifier::new(Arc::new(gateway), web.clone());

        verifier
            .verify(&idea_with_outline(&refs), &[], &ChatSettings::default())
            .await;

        assert_eq!(
            web.queries.lock().unwrap().len(),
            defaults::MAX_CLAIMS_TO_VERIFY
        );
    }

    #[tokio::test]
    async fn test_summary_key_points_become_claims() {
        let gateway = MockGateway::new().with_default_response(r#"{"supported": false}"#);
        let web = Arc::new(ScriptedWeb::with_results(vec![]));
        let verifier = FactVerifier::new(Arc::new(gateway), web.clone());

        let summaries = vec![Summary {
            facet_name: "f".into(),
            text: "t".into(),
            key_points: vec!["key point claim".into()],
            cited_chunk_ids: vec![],
            confidence: 0.8,
            no_grounding: false,
        }];
        verifier
            .verify(&idea_with_outline(&[]), &summaries, &ChatSettings::default())
            .await;

        let queries = web.queries.lock().unwrap();
        assert!(queries.contains(&"key point claim".to_string()));
    }

    #[tokio::test]
    async fn test_mixed_support_averages_confidence() {
        let gateway = MockGateway::new()
            .with_response("supported claim", r#"{"supported": true}"#)
            .with_response("shaky claim", r#"{"supported": false}"#);
        let web = Arc::new(ScriptedWeb::with_results(vec![snippet(
            "https://example.com/a",
        )]));
        let verifier = FactVerifier::new(Arc::new(gateway), web);

        let out = verifier
            .verify(
                &idea_with_outline(&["supported claim", "shaky claim"]),
                &[],
                &ChatSettings::default(),
            )
            .await;

        assert_eq!(out.overall_confidence, Some(0.5));
    }

    #[tokio::test]
    async fn test_no_claims_yields_default() {
        let gateway = MockGateway::new();
        let web = Arc::new(ScriptedWeb::with_results(vec![]));
        let verifier = FactVerifier::new(Arc::new(gateway), web);

        let out = verifier
            .verify(&idea_with_outline(&[]), &[], &ChatSettings::default())
            .await;
        assert!(out.claims.is_empty());
        assert!(out.overall_confidence.is_none());
    }
}
