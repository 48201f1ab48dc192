//! Orchestrator: one request through the whole pipeline.
//!
//! The orchestrator owns the capability handles and is the only place
//! branching logic lives — optional stages, the critic loop, fallbacks.
//! Stage order per request:
//!
//! 1. memory load (degradable)
//! 2. planner (required; failure produces a best-effort apology response)
//! 3. retrieval, with web research alongside when enabled (required; only
//!    a total outage fails it)
//! 4. summarizer (per-facet, concurrent)
//! 5. idea generator → critic loop → fact verifier → tool executor, each
//!    strictly sequential and individually optional
//! 6. final writer
//! 7. memory extraction (skipped entirely for aborted requests)
//!
//! The caller always receives a well-formed [`MasterAiResponse`]; failures
//! surface only through metadata flags. The one typed error the public
//! surface can return is [`Error::Aborted`] from [`Orchestrator::ask_with_abort`].

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use maestro_core::{
    ChatMessage, ChatSettings, EmbeddingBackend, Error, FactVerificationOutput, KnowledgeStore,
    MasterAiResponse, ModelGateway, ModelsUsed, PipelineMetadata, Result, Stage, ToolRuntime,
    WebSearch,
};
use maestro_memory::MemoryManager;
use maestro_retrieval::Retriever;

use crate::critic::Critic;
use crate::idea::IdeaGenerator;
use crate::planner::Planner;
use crate::research::WebResearcher;
use crate::summarizer::Summarizer;
use crate::tools::{ToolCallResult, ToolCallState, ToolExecutor, ToolRegistry};
use crate::verifier::FactVerifier;
use crate::writer::{FinalWriter, WriterInput};

/// One pipeline request.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub question: String,
    pub settings: ChatSettings,
    /// Enables the memory subsystem when present.
    pub user_id: Option<String>,
    pub conversation_context: Vec<ChatMessage>,
}

impl PipelineRequest {
    /// A request with default settings and no user context.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            settings: ChatSettings::default(),
            user_id: None,
            conversation_context: Vec::new(),
        }
    }
}

/// Wires the pipeline stages over explicitly injected capabilities.
///
/// Construct one per process and share it; it is stateless across requests.
pub struct Orchestrator {
    gateway: Arc<dyn ModelGateway>,
    embeddings: Arc<dyn EmbeddingBackend>,
    knowledge: Arc<dyn KnowledgeStore>,
    web: Option<Arc<dyn WebSearch>>,
    tool_runtime: Option<Arc<dyn ToolRuntime>>,
    tool_registry: ToolRegistry,
    memory: Option<Arc<MemoryManager>>,
}

impl Orchestrator {
    /// Create an orchestrator over the required capabilities.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        embeddings: Arc<dyn EmbeddingBackend>,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            gateway,
            embeddings,
            knowledge,
            web: None,
            tool_runtime: None,
            tool_registry: ToolRegistry::platform_default(),
            memory: None,
        }
    }

    /// Enable web research and fact verification.
    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = Some(web);
        self
    }

    /// Enable agent mode with the given runtime and tool table.
    pub fn with_tools(mut self, runtime: Arc<dyn ToolRuntime>, registry: ToolRegistry) -> Self {
        self.tool_runtime = Some(runtime);
        self.tool_registry = registry;
        self
    }

    /// Enable the memory subsystem.
    pub fn with_memory(mut self, memory: Arc<MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Run the full pipeline. Always returns a well-formed response.
    pub async fn ask(&self, request: PipelineRequest) -> MasterAiResponse {
        let start = Instant::now();
        let request_id = Uuid::new_v4();

        info!(request_id = %request_id, preset = ?request.settings.preset, "Pipeline starting");
        let response = self.run(&request, start).await;
        info!(
            request_id = %request_id,
            duration_ms = response.pipeline_metadata.processing_time_ms,
            chunk_count = response.pipeline_metadata.total_chunks_processed,
            degraded = response.pipeline_metadata.degraded,
            "Pipeline complete"
        );
        response
    }

    /// Run the pipeline with caller-initiated abort.
    ///
    /// When the abort signal fires, in-flight work is dropped, completed
    /// stage outputs are discarded, and nothing is persisted — the memory
    /// extraction step only runs after a request finishes.
    pub async fn ask_with_abort(
        &self,
        request: PipelineRequest,
        mut abort: watch::Receiver<bool>,
    ) -> Result<MasterAiResponse> {
        tokio::select! {
            response = self.ask(request) => Ok(response),
            _ = aborted(&mut abort) => {
                warn!("Pipeline aborted by caller");
                Err(Error::Aborted)
            }
        }
    }

    async fn run(&self, request: &PipelineRequest, start: Instant) -> MasterAiResponse {
        let settings = &request.settings;

        // ── Memory load ────────────────────────────────────────────────
        let memory_block = match (&self.memory, &request.user_id) {
            (Some(memory), Some(user_id)) => {
                let memories = memory.load_relevant(user_id, &request.question).await;
                memory.format_block(&memories)
            }
            _ => String::new(),
        };

        // ── Planner (required) ─────────────────────────────────────────
        let planner = Planner::new(self.gateway.clone());
        let plan = match planner
            .plan(&request.question, settings, &request.conversation_context)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                error!(stage = "planner", error = %e, "Required stage failed");
                return self.apology(settings, start, 0);
            }
        };

        // ── Retrieval ∥ web research ───────────────────────────────────
        let retriever = Retriever::new(self.embeddings.clone(), self.knowledge.clone());
        let research_web = settings
            .enable_web_research
            .then(|| self.web.clone())
            .flatten();
        let (retrieved, research) = tokio::join!(retriever.retrieve(&plan, settings), async {
            match research_web {
                Some(web) => Some(WebResearcher::new(web).research(&plan.facets, settings).await),
                None => None,
            }
        });
        let retrieved = match retrieved {
            Ok(retrieved) => retrieved,
            Err(e) => {
                error!(stage = "retriever", error = %e, "Required stage failed");
                return self.apology(settings, start, 0);
            }
        };

        let facets_used: Vec<String> = plan.facets.iter().map(|f| f.name.clone()).collect();
        let web_results = research.as_ref().map_or(0, |r| r.total_results);

        // ── No grounding anywhere: answer honestly without a writer call ──
        if retrieved.total_chunks_retrieved == 0 && web_results == 0 {
            return self.no_grounding_response(settings, start, facets_used);
        }

        // ── Summarizer ─────────────────────────────────────────────────
        let summarizer = Summarizer::new(self.gateway.clone());
        let summaries = summarizer
            .summarize(&retrieved, &request.question, settings)
            .await;

        // ── Idea generation ────────────────────────────────────────────
        let generator = IdeaGenerator::new(self.gateway.clone());
        let mut ideas = generator
            .generate(&summaries, &plan.intent, settings)
            .await;
        let leading = ideas.remove(0);

        // ── Critic loop ────────────────────────────────────────────────
        let (idea, critic_approved) = if settings.enable_critic {
            let critic = Critic::new(self.gateway.clone());
            let verdict = critic
                .review(leading, &plan.intent, &summaries, settings)
                .await;
            (verdict.idea, Some(verdict.approved))
        } else {
            (leading, None)
        };

        // ── Fact verification ──────────────────────────────────────────
        let verification: Option<FactVerificationOutput> = if settings.enable_fact_verification {
            match &self.web {
                Some(web) => {
                    let verifier = FactVerifier::new(self.gateway.clone(), web.clone());
                    Some(verifier.verify(&idea, &summaries, settings).await)
                }
                None => {
                    warn!("Fact verification enabled without a web search capability");
                    Some(FactVerificationOutput::default())
                }
            }
        } else {
            None
        };
        let verification_skipped = settings.enable_fact_verification
            && verification
                .as_ref()
                .is_some_and(|v| v.overall_confidence.is_none());

        // ── Agent mode ─────────────────────────────────────────────────
        let mut tool_results: Vec<ToolCallResult> = Vec::new();
        if settings.enable_agent_mode {
            if let Some(runtime) = &self.tool_runtime {
                let executor = ToolExecutor::new(
                    self.gateway.clone(),
                    runtime.clone(),
                    self.tool_registry.clone(),
                );
                let proposal = executor
                    .propose(&request.question, &plan.intent, settings)
                    .await;
                if !proposal.proposed_calls.is_empty() {
                    // Confirmable calls stay proposed; approval happens out of band.
                    tool_results = executor.execute(&proposal, false).await;
                }
            }
        }

        // ── Final writer ───────────────────────────────────────────────
        let writer = FinalWriter::new(self.gateway.clone());
        let written = writer
            .write(
                WriterInput {
                    question: &request.question,
                    idea: &idea,
                    summaries: &summaries,
                    retrieved: &retrieved,
                    memory_block: &memory_block,
                    conversation_context: &request.conversation_context,
                    verification: verification.as_ref(),
                    web_research: research.as_ref(),
                    tool_results: &tool_results,
                },
                settings,
            )
            .await;

        let response = MasterAiResponse {
            content: written.content,
            citations: written.citations,
            facets_used,
            pipeline_metadata: PipelineMetadata {
                models_used: self.models_used(settings),
                processing_time_ms: start.elapsed().as_millis() as u64,
                total_chunks_processed: retrieved.total_chunks_retrieved,
                critic_approved,
                verification_skipped,
                web_results,
                tool_calls_executed: tool_results.iter().filter(|r| r.success).count(),
                tool_calls_rejected: tool_results
                    .iter()
                    .filter(|r| r.state == ToolCallState::Rejected)
                    .count(),
                degraded: written.degraded,
            },
        };

        // ── Memory extraction (never for aborted requests — an abort
        //    drops this future before we get here) ──────────────────────
        if let (Some(memory), Some(user_id)) = (&self.memory, &request.user_id) {
            let mut conversation = request.conversation_context.clone();
            conversation.push(ChatMessage::user(&request.question));
            memory
                .extract_and_persist(user_id, settings, &conversation, &response.content)
                .await;
        }

        response
    }

    /// Best-effort response when a required stage is down.
    fn apology(
        &self,
        settings: &ChatSettings,
        start: Instant,
        total_chunks: usize,
    ) -> MasterAiResponse {
        MasterAiResponse {
            content: "I ran into a problem answering this right now. Nothing is wrong with \
your question — please try again in a moment."
                .to_string(),
            citations: Vec::new(),
            facets_used: Vec::new(),
            pipeline_metadata: PipelineMetadata {
                models_used: self.models_used(settings),
                processing_time_ms: start.elapsed().as_millis() as u64,
                total_chunks_processed: total_chunks,
                degraded: true,
                ..Default::default()
            },
        }
    }

    /// Honest empty-knowledge response; no writer call, no citations.
    fn no_grounding_response(
        &self,
        settings: &ChatSettings,
        start: Instant,
        facets_used: Vec<String>,
    ) -> MasterAiResponse {
        MasterAiResponse {
            content: "I couldn't find relevant material in the knowledge base for this \
question. It may not be covered yet — try rephrasing, or ask about a related topic."
                .to_string(),
            citations: Vec::new(),
            facets_used,
            pipeline_metadata: PipelineMetadata {
                models_used: self.models_used(settings),
                processing_time_ms: start.elapsed().as_millis() as u64,
                total_chunks_processed: 0,
                ..Default::default()
            },
        }
    }

    fn models_used(&self, settings: &ChatSettings) -> ModelsUsed {
        ModelsUsed {
            planner: settings.model_for(Stage::Planner),
            summarizer: settings.model_for(Stage::Summarizer),
            idea_generator: Some(settings.model_for(Stage::IdeaGenerator)),
            critic: settings
                .enable_critic
                .then(|| settings.model_for(Stage::Critic)),
            fact_verifier: settings
                .enable_fact_verification
                .then(|| settings.model_for(Stage::FactVerifier)),
            tool_planner: settings
                .enable_agent_mode
                .then(|| settings.model_for(Stage::ToolPlanner)),
            final_writer: settings.model_for(Stage::FinalWriter),
        }
    }
}

/// Resolves when the abort flag flips to true; pends forever if the sender
/// is dropped without aborting.
async fn aborted(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
