//! Tool/action executor: agent-mode platform actions behind a declared schema.
//!
//! A fixed registry declares every tool the model may propose, with a typed
//! parameter schema per tool. The tool-planner call emits an
//! [`ActionProposal`]; each proposed call is validated against its schema
//! before execution, and invalid calls are rejected individually without
//! aborting the batch. Execution results are merged back into the final
//! writer's context.
//!
//! Per-call lifecycle: `Proposed → Validated → Executed → Reported`, or
//! `Proposed → Rejected` on validation failure. Runtime failures mark the
//! call failed but the batch continues.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, GenerationRequest, ModelGateway, Stage,
    ToolRuntime,
};

// =============================================================================
// TOOL SCHEMA
// =============================================================================

/// Parameter type in a tool schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ToolParamKind {
    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: &'static str,
    pub kind: ToolParamKind,
    pub required: bool,
    pub description: &'static str,
    /// Allowed values for string parameters; empty = unrestricted.
    pub allowed_values: &'static [&'static str],
}

/// One declared tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ToolParameter],
    /// Calls to this tool need explicit caller approval before execution.
    pub requires_confirmation: bool,
}

/// The fixed table of tools the model may propose.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

/// Platform actions available in agent mode.
static CREATE_NOTE_PARAMS: &[ToolParameter] = &[
    ToolParameter {
        name: "title",
        kind: ToolParamKind::String,
        required: true,
        description: "Note title",
        allowed_values: &[],
    },
    ToolParameter {
        name: "content",
        kind: ToolParamKind::String,
        required: true,
        description: "Note body in markdown",
        allowed_values: &[],
    },
];

static CREATE_COURSE_DRAFT_PARAMS: &[ToolParameter] = &[
    ToolParameter {
        name: "title",
        kind: ToolParamKind::String,
        required: true,
        description: "Course title",
        allowed_values: &[],
    },
    ToolParameter {
        name: "description",
        kind: ToolParamKind::String,
        required: false,
        description: "What students will learn",
        allowed_values: &[],
    },
    ToolParameter {
        name: "skill_level",
        kind: ToolParamKind::String,
        required: false,
        description: "Target skill level",
        allowed_values: &["beginner", "intermediate", "advanced", "all_levels"],
    },
    ToolParameter {
        name: "price",
        kind: ToolParamKind::Number,
        required: false,
        description: "Price in dollars, 0 for free",
        allowed_values: &[],
    },
];

static ADD_COURSE_MODULE_PARAMS: &[ToolParameter] = &[
    ToolParameter {
        name: "course_id",
        kind: ToolParamKind::String,
        required: true,
        description: "Course to add the module to",
        allowed_values: &[],
    },
    ToolParameter {
        name: "title",
        kind: ToolParamKind::String,
        required: true,
        description: "Module title",
        allowed_values: &[],
    },
    ToolParameter {
        name: "lessons",
        kind: ToolParamKind::Array,
        required: false,
        description: "Lesson titles in order",
        allowed_values: &[],
    },
];

static SCHEDULE_POST_PARAMS: &[ToolParameter] = &[
    ToolParameter {
        name: "platform",
        kind: ToolParamKind::String,
        required: true,
        description: "Social platform to post to",
        allowed_values: &["instagram", "tiktok", "youtube", "x"],
    },
    ToolParameter {
        name: "content",
        kind: ToolParamKind::String,
        required: true,
        description: "Post copy",
        allowed_values: &[],
    },
    ToolParameter {
        name: "scheduled_at",
        kind: ToolParamKind::String,
        required: false,
        description: "ISO 8601 time; immediate when omitted",
        allowed_values: &[],
    },
];

static SEARCH_CATALOG_PARAMS: &[ToolParameter] = &[ToolParameter {
    name: "query",
    kind: ToolParamKind::String,
    required: true,
    description: "What to look for in the catalog",
    allowed_values: &[],
}];

impl ToolRegistry {
    /// The platform's declared tool table.
    pub fn platform_default() -> Self {
        Self {
            tools: vec![
                ToolDefinition {
                    name: "create_note",
                    description: "Save a note to the creator's workspace",
                    parameters: CREATE_NOTE_PARAMS,
                    requires_confirmation: false,
                },
                ToolDefinition {
                    name: "create_course_draft",
                    description: "Create an unpublished course draft",
                    parameters: CREATE_COURSE_DRAFT_PARAMS,
                    requires_confirmation: true,
                },
                ToolDefinition {
                    name: "add_course_module",
                    description: "Add a module to an existing course",
                    parameters: ADD_COURSE_MODULE_PARAMS,
                    requires_confirmation: true,
                },
                ToolDefinition {
                    name: "schedule_post",
                    description: "Schedule a social media post",
                    parameters: SCHEDULE_POST_PARAMS,
                    requires_confirmation: true,
                },
                ToolDefinition {
                    name: "search_catalog",
                    description: "Search the creator's product catalog",
                    parameters: SEARCH_CATALOG_PARAMS,
                    requires_confirmation: false,
                },
            ],
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// All declared tools.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Render the tool table for the proposal prompt.
    pub fn prompt_block(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                let params = tool
                    .parameters
                    .iter()
                    .map(|p| {
                        let required = if p.required { "required" } else { "optional" };
                        let values = if p.allowed_values.is_empty() {
                            String::new()
                        } else {
                            format!(", one of: {}", p.allowed_values.join("|"))
                        };
                        format!("  - {} ({:?}, {required}{values}): {}", p.name, p.kind, p.description)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}: {}\n{params}", tool.name, tool.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// PROPOSAL & LIFECYCLE
// =============================================================================

/// One model-proposed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub parameters: JsonValue,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A batch of proposed calls from the tool-planner stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionProposal {
    #[serde(default)]
    pub proposed_calls: Vec<ToolCall>,
    /// True when any proposed call needs caller approval.
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Where a call ended up in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Proposed,
    Validated,
    Executed,
    Reported,
    Rejected,
}

/// Terminal record for one proposed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool: String,
    pub state: ToolCallState,
    pub success: bool,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Validate call parameters against a tool's declared schema.
///
/// Returns the full list of violations, not just the first.
pub fn validate_parameters(tool: &ToolDefinition, params: &JsonValue) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(map) = params.as_object() else {
        return vec!["parameters must be a JSON object".to_string()];
    };

    for param in tool.parameters {
        match map.get(param.name) {
            None => {
                if param.required {
                    errors.push(format!("missing required parameter: {}", param.name));
                }
            }
            Some(value) => {
                if !param.kind.matches(value) {
                    errors.push(format!(
                        "parameter {} must be a {:?}",
                        param.name, param.kind
                    ));
                }
                if !param.allowed_values.is_empty() {
                    if let Some(s) = value.as_str() {
                        if !param.allowed_values.contains(&s) {
                            errors.push(format!(
                                "parameter {} must be one of: {}",
                                param.name,
                                param.allowed_values.join(", ")
                            ));
                        }
                    }
                }
            }
        }
    }

    errors
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Proposes and executes platform actions in agent mode.
pub struct ToolExecutor {
    gateway: Arc<dyn ModelGateway>,
    runtime: Arc<dyn ToolRuntime>,
    registry: ToolRegistry,
}

impl ToolExecutor {
    /// Create an executor over the given capabilities and tool table.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        runtime: Arc<dyn ToolRuntime>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            gateway,
            runtime,
            registry,
        }
    }

    /// The registry this executor validates against.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Ask the model whether any platform actions would serve the request.
    ///
    /// A dead gateway or unusable reply degrades to an empty proposal.
    pub async fn propose(
        &self,
        question: &str,
        intent: &str,
        settings: &ChatSettings,
    ) -> ActionProposal {
        let system = format!(
            "You decide whether platform actions would help fulfil a request. \
Available tools:\n{}\n\nRespond with JSON: {{\"proposed_calls\": \
[{{\"tool\": \"name\", \"parameters\": {{...}}, \"reasoning\": \"why\"}}], \
\"requires_confirmation\": bool}}. \
Propose calls only when the user clearly asked for an action. \
Respond with {{\"proposed_calls\": []}} otherwise.",
            self.registry.prompt_block()
        );

        let prompt = format!("Request: {question}\nIntent: {intent}");
        let request = GenerationRequest::new(
            settings.model_for(Stage::ToolPlanner),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(defaults::STRUCTURED_TEMPERATURE)
        .with_max_tokens(defaults::MAX_TOKENS);

        let mut proposal = match self.gateway.call(request).await {
            Ok(response) => {
                guard::parse_or_default(&response.content, ActionProposal::default())
            }
            Err(e) => {
                warn!(error = %e, "Tool proposal call failed");
                ActionProposal::default()
            }
        };

        // The confirmation flag is derived from the declared table, not
        // trusted from the model.
        proposal.requires_confirmation = proposal.proposed_calls.iter().any(|call| {
            self.registry
                .get(&call.tool)
                .is_some_and(|t| t.requires_confirmation)
        });
        proposal
    }

    /// Validate and execute a batch of proposed calls.
    ///
    /// Each call is handled independently: schema violations reject that
    /// call, runtime failures fail that call, and the rest of the batch
    /// proceeds. Calls needing confirmation stay `Proposed` unless
    /// `auto_confirm` is set.
    pub async fn execute(&self, proposal: &ActionProposal, auto_confirm: bool) -> Vec<ToolCallResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(proposal.proposed_calls.len());

        for call in &proposal.proposed_calls {
            results.push(self.execute_call(call, auto_confirm).await);
        }

        let executed = results.iter().filter(|r| r.success).count();
        info!(
            result_count = results.len(),
            executed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool batch complete"
        );
        results
    }

    async fn execute_call(&self, call: &ToolCall, auto_confirm: bool) -> ToolCallResult {
        let Some(tool) = self.registry.get(&call.tool) else {
            return ToolCallResult {
                tool: call.tool.clone(),
                state: ToolCallState::Rejected,
                success: false,
                result: None,
                error: Some(format!("unknown tool: {}", call.tool)),
            };
        };

        let violations = validate_parameters(tool, &call.parameters);
        if !violations.is_empty() {
            debug!(tool = %call.tool, ?violations, "Tool call rejected");
            return ToolCallResult {
                tool: call.tool.clone(),
                state: ToolCallState::Rejected,
                success: false,
                result: None,
                error: Some(violations.join("; ")),
            };
        }

        if tool.requires_confirmation && !auto_confirm {
            return ToolCallResult {
                tool: call.tool.clone(),
                state: ToolCallState::Proposed,
                success: false,
                result: None,
                error: Some("requires confirmation".to_string()),
            };
        }

        match self.runtime.execute(&call.tool, &call.parameters).await {
            Ok(result) => ToolCallResult {
                tool: call.tool.clone(),
                state: ToolCallState::Reported,
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                warn!(tool = %call.tool, error = %e, "Tool execution failed");
                ToolCallResult {
                    tool: call.tool.clone(),
                    state: ToolCallState::Executed,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
