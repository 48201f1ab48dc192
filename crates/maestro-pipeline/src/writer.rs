//! Final writer stage: compose the cited answer.
//!
//! Builds a numbered citation map over the full retrieved corpus, writes
//! the answer with inline `[[n]]` markers, then resolves citations by
//! extracting exactly the markers that appear in the composed text. A
//! citation can only ever point at a chunk that was retrieved this request;
//! indices the model invents resolve to nothing and are dropped.
//!
//! A failed generation degrades to an answer assembled from the facet
//! summaries, with no citations and the degraded flag set — the caller
//! still receives well-formed output.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tracing::{info, warn};

use maestro_core::{
    defaults, ChatMessage, ChatSettings, Chunk, Citation, FactVerificationOutput,
    GenerationRequest, Idea, ModelGateway, ResponseStyle, RetrieverOutput, Stage, Summary,
};

use crate::research::ResearchOutput;
use crate::tools::ToolCallResult;

/// Everything the writer composes from.
pub struct WriterInput<'a> {
    pub question: &'a str,
    pub idea: &'a Idea,
    pub summaries: &'a [Summary],
    pub retrieved: &'a RetrieverOutput,
    pub memory_block: &'a str,
    pub conversation_context: &'a [ChatMessage],
    pub verification: Option<&'a FactVerificationOutput>,
    pub web_research: Option<&'a ResearchOutput>,
    pub tool_results: &'a [ToolCallResult],
}

/// The writer's product: prose plus resolved citations.
#[derive(Debug, Clone)]
pub struct WriterOutput {
    pub content: String,
    pub citations: Vec<Citation>,
    /// Set when the model call failed and the summary fallback was used.
    pub degraded: bool,
}

/// Composes the final answer.
pub struct FinalWriter {
    gateway: Arc<dyn ModelGateway>,
}

impl FinalWriter {
    /// Create a writer over the given gateway.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Write the final answer. Infallible surface; failure degrades.
    pub async fn write(&self, input: WriterInput<'_>, settings: &ChatSettings) -> WriterOutput {
        let start = Instant::now();
        let citation_map = build_citation_map(input.retrieved);

        let system = self.system_prompt(&input, settings, &citation_map);
        let user = self.user_prompt(&input);

        let mut messages = vec![ChatMessage::system(system)];
        let skip = input
            .conversation_context
            .len()
            .saturating_sub(defaults::CONTEXT_TURNS);
        for turn in &input.conversation_context[skip..] {
            let content: String = turn
                .content
                .chars()
                .take(defaults::CONTEXT_MESSAGE_CHAR_CAP)
                .collect();
            messages.push(ChatMessage {
                role: turn.role,
                content,
            });
        }
        messages.push(ChatMessage::user(user));

        let request = GenerationRequest::new(settings.model_for(Stage::FinalWriter), messages)
            .with_temperature(defaults::TEMPERATURE)
            .with_max_tokens(defaults::WRITER_MAX_TOKENS);

        match self.gateway.call(request).await {
            Ok(response) => {
                let citations = extract_used_citations(&response.content, &citation_map);
                info!(
                    response_len = response.content.len(),
                    result_count = citations.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Answer written"
                );
                WriterOutput {
                    content: response.content,
                    citations,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "Final writer failed, falling back to summaries");
                WriterOutput {
                    content: summary_fallback(input.summaries),
                    citations: Vec::new(),
                    degraded: true,
                }
            }
        }
    }

    fn system_prompt(
        &self,
        input: &WriterInput<'_>,
        settings: &ChatSettings,
        citation_map: &BTreeMap<usize, Citation>,
    ) -> String {
        let mut prompt = String::from(
            "You are the platform's resident educator for music creators: direct, precise, \
and practical. Give real, actionable knowledge with specific values and settings, \
not generic overviews. Hedge technical claims appropriately (\"typically\", \"often\") \
and never invent material for topics the knowledge base does not cover.\n\n",
        );

        prompt.push_str(style_instructions(settings.response_style));
        prompt.push_str("\n\n");

        if !input.memory_block.is_empty() {
            prompt.push_str(input.memory_block);
            prompt.push_str("\n\n");
        }

        prompt.push_str(
            "CITATIONS:\nCite sources inline with double-bracket numbers: [[1]] or [[1,2]], \
placed right after the statement they support. Only use the numbers listed below.\n\n",
        );
        prompt.push_str(&citation_guide(citation_map));
        prompt
    }

    fn user_prompt(&self, input: &WriterInput<'_>) -> String {
        let mut prompt = format!("Question: {}\n", input.question);

        prompt.push_str(&format!(
            "\nApproach: {}\nOutline:\n{}\n",
            input.idea.angle,
            input
                .idea
                .outline
                .iter()
                .map(|o| format!("- {o}"))
                .collect::<Vec<_>>()
                .join("\n")
        ));

        prompt.push_str("\nKnowledge base material:\n");
        for summary in input.summaries {
            let text: String = summary
                .text
                .chars()
                .take(defaults::SUMMARY_CHAR_BUDGET)
                .collect();
            let gap = if summary.no_grounding {
                " (no grounding found — acknowledge the gap, do not invent)"
            } else {
                ""
            };
            prompt.push_str(&format!("\n## {}{}\n{}\n", summary.facet_name, gap, text));
            if !summary.key_points.is_empty() {
                prompt.push_str(&format!("Key points: {}\n", summary.key_points.join("; ")));
            }
        }

        if let Some(research) = input.web_research {
            if research.total_results > 0 {
                prompt.push_str(
                    "\nWeb research (context only — NOT citable with [[n]] numbers):\n",
                );
                for facet in &research.by_facet {
                    for snippet in &facet.results {
                        let excerpt: String = snippet.content.chars().take(500).collect();
                        prompt.push_str(&format!("- {} ({}): {}\n", snippet.title, snippet.url, excerpt));
                    }
                }
            }
        }

        if let Some(verification) = input.verification {
            let shaky: Vec<&str> = verification
                .claims
                .iter()
                .filter(|c| !c.supported)
                .map(|c| c.text.as_str())
                .collect();
            if !shaky.is_empty() {
                prompt.push_str(
                    "\nFact-check notes (handle with care — qualify or drop these claims):\n",
                );
                for claim in shaky {
                    prompt.push_str(&format!("- unverified: {claim}\n"));
                }
            }
        }

        if !input.tool_results.is_empty() {
            prompt.push_str("\nActions taken on the user's behalf (report these outcomes):\n");
            for result in input.tool_results {
                match (&result.success, &result.result, &result.error) {
                    (true, Some(value), _) => {
                        prompt.push_str(&format!("- {} succeeded: {}\n", result.tool, value))
                    }
                    (_, _, Some(error)) => {
                        prompt.push_str(&format!("- {} failed: {}\n", result.tool, error))
                    }
                    _ => prompt.push_str(&format!("- {}: no result\n", result.tool)),
                }
            }
        }

        prompt.push_str("\nWrite the answer now, with inline citations.");
        prompt
    }
}

// =============================================================================
// CITATIONS
// =============================================================================

/// Number every distinct retrieved chunk in bucket order. First occurrence
/// wins when the same chunk was retrieved for multiple facets.
pub fn build_citation_map(retrieved: &RetrieverOutput) -> BTreeMap<usize, Citation> {
    let mut map = BTreeMap::new();
    let mut seen: Vec<&str> = Vec::new();

    for chunk in retrieved.all_chunks() {
        if seen.contains(&chunk.id.as_str()) {
            continue;
        }
        seen.push(&chunk.id);
        let id = map.len() + 1;
        map.insert(id, citation_for(id, chunk));
    }
    map
}

fn citation_for(id: usize, chunk: &Chunk) -> Citation {
    Citation {
        id,
        source_id: chunk.source_id.clone(),
        source_type: chunk.source_type.clone(),
        title: chunk.title.clone(),
    }
}

/// The numbered source list shown to the model, capped to keep the prompt
/// bounded on chunk-heavy requests.
fn citation_guide(map: &BTreeMap<usize, Citation>) -> String {
    if map.is_empty() {
        return "No sources are available. Do not emit [[n]] markers.".to_string();
    }

    let mut lines = vec!["Available sources:".to_string()];
    for (id, citation) in map.iter().take(defaults::CITATION_GUIDE_CAP) {
        lines.push(format!(
            "[[{}]] {} ({})",
            id, citation.title, citation.source_type
        ));
    }
    if map.len() > defaults::CITATION_GUIDE_CAP {
        lines.push(format!(
            "… and {} more sources, numbered up to [[{}]]",
            map.len() - defaults::CITATION_GUIDE_CAP,
            map.len()
        ));
    }
    lines.join("\n")
}

/// Resolve the `[[n]]`/`[[n,m]]` markers actually present in the text.
/// Indices outside the map are fabrications and resolve to nothing.
pub fn extract_used_citations(
    text: &str,
    map: &BTreeMap<usize, Citation>,
) -> Vec<Citation> {
    let marker = Regex::new(r"\[\[(\d+(?:\s*,\s*\d+)*)\]\]").expect("static regex");
    let mut used = Vec::new();

    for captures in marker.captures_iter(text) {
        for raw_id in captures[1].split(',') {
            if let Ok(id) = raw_id.trim().parse::<usize>() {
                if map.contains_key(&id) && !used.contains(&id) {
                    used.push(id);
                }
            }
        }
    }

    used.sort_unstable();
    used.into_iter()
        .filter_map(|id| map.get(&id).cloned())
        .collect()
}

/// Last-resort answer assembled from whatever the summarizer produced.
fn summary_fallback(summaries: &[Summary]) -> String {
    let grounded: Vec<&Summary> = summaries.iter().filter(|s| !s.no_grounding).collect();
    if grounded.is_empty() {
        return "I couldn't generate a full answer right now, and the knowledge base had \
no material on this topic. Please try again or rephrase the question."
            .to_string();
    }

    let mut content = String::from(
        "I couldn't generate a full answer right now. Here is what the knowledge base has:\n",
    );
    for summary in grounded {
        let text: String = summary.text.chars().take(600).collect();
        content.push_str(&format!("\n**{}**\n{}\n", summary.facet_name, text));
    }
    content
}

/// Style-specific writing instructions.
fn style_instructions(style: ResponseStyle) -> &'static str {
    match style {
        ResponseStyle::Structured => {
            "STYLE: Structured reference. Open with the 2-3 key takeaways, then logical \
sections with descriptive headers. Bullets for settings and parameters, numbered \
lists for step-by-step processes with exact values. Cover each concept once."
        }
        ResponseStyle::Conversational => {
            "STYLE: Flowing essay. Teach progressively in natural paragraphs, one concept \
per paragraph, with concrete values woven into the explanations. One anchoring \
metaphor at most, then clean technical language."
        }
        ResponseStyle::Concise => {
            "STYLE: Brief and direct. Lead with the answer in 1-2 sentences, essential \
details only, at most 3-4 short paragraphs. End with one actionable tip."
        }
    }
}
