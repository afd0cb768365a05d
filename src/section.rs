//! Section planning: split one API specification into independently schedulable sections.

use crate::agent::AgentKind;
use crate::error::ApiError;
use crate::provider::{complete_json, ChatMessage, ModelProviderClient};
use crate::types::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Single API operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Functional,
    Integration,
    Negative,
    Security,
    Performance,
    Boundary,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Functional => "functional",
            TestType::Integration => "integration",
            TestType::Negative => "negative",
            TestType::Security => "security",
            TestType::Performance => "performance",
            TestType::Boundary => "boundary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Test case the planner recommends for a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTestCase {
    pub name: String,
    pub test_type: TestType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Independently processable slice of the specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(alias = "section_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub test_cases: Vec<SuggestedTestCase>,
    #[serde(default)]
    pub estimated_tokens: u64,
}

impl Section {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            endpoints: Vec::new(),
            test_cases: Vec::new(),
            estimated_tokens: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_endpoint(mut self, method: &str, path: &str) -> Self {
        self.endpoints.push(Endpoint {
            path: path.to_string(),
            method: method.to_string(),
            summary: None,
            tags: Vec::new(),
        });
        self
    }

    /// Markdown context block handed to generator prompts.
    pub fn context_text(&self) -> String {
        let mut context = format!(
            "## Section: {}\n\n**Description:** {}\n\n**Endpoints to Process:**",
            self.name, self.description
        );
        for endpoint in &self.endpoints {
            context.push_str(&format!("\n- {} {}", endpoint.method, endpoint.path));
            if let Some(summary) = &endpoint.summary {
                context.push_str(&format!(": {}", summary));
            }
        }
        context.push_str("\n\n**Test Cases to Generate:**");
        for test_case in &self.test_cases {
            context.push_str(&format!(
                "\n- {} ({})",
                test_case.name,
                test_case.test_type.as_str()
            ));
        }
        context
    }
}

/// How the planner should split the specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectioningStrategy {
    ByTag,
    ByPath,
    ByMethod,
    ByComplexity,
    Manual,
    #[default]
    Auto,
}

impl SectioningStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectioningStrategy::ByTag => "by_tag",
            SectioningStrategy::ByPath => "by_path",
            SectioningStrategy::ByMethod => "by_method",
            SectioningStrategy::ByComplexity => "by_complexity",
            SectioningStrategy::Manual => "manual",
            SectioningStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for SectioningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectioningStrategy {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "by_tag" => Ok(SectioningStrategy::ByTag),
            "by_path" => Ok(SectioningStrategy::ByPath),
            "by_method" => Ok(SectioningStrategy::ByMethod),
            "by_complexity" => Ok(SectioningStrategy::ByComplexity),
            "manual" => Ok(SectioningStrategy::Manual),
            "auto" => Ok(SectioningStrategy::Auto),
            other => Err(ApiError::Validation(format!(
                "Unknown sectioning strategy: {}",
                other
            ))),
        }
    }
}

/// Ordered planner output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionPlan {
    pub strategy_used: SectioningStrategy,
    pub sections: Vec<Section>,
    pub estimated_total_tokens: u64,
    pub reasoning: String,
    /// Usage of the planning call itself
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl SectionPlan {
    /// Reject empty plans, empty ids and duplicate ids.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.sections.is_empty() {
            return Err(ApiError::Planning("plan contains no sections".to_string()));
        }
        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err(ApiError::Planning(format!(
                    "section '{}' has an empty id",
                    section.name
                )));
            }
            if !seen.insert(section.id.as_str()) {
                return Err(ApiError::Planning(format!(
                    "duplicate section id: {}",
                    section.id
                )));
            }
        }
        Ok(())
    }

    /// Single catch-all section used when planning cannot produce a usable plan.
    pub fn fallback(max_tokens_per_section: u32) -> Self {
        let tokens = u64::from(max_tokens_per_section);
        let mut section = Section::new("fallback_001", "Complete API")
            .with_description("Fallback section containing all endpoints");
        section.estimated_tokens = tokens;
        Self {
            strategy_used: SectioningStrategy::Auto,
            sections: vec![section],
            estimated_total_tokens: tokens,
            reasoning: "Fallback analysis due to processing error".to_string(),
            token_usage: TokenUsage::default(),
        }
    }
}

/// Everything the planner is told about the run
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub strategy: SectioningStrategy,
    pub focus: Option<String>,
    pub max_tokens_per_section: u32,
    /// Service-side ids of the uploaded inputs
    pub file_ids: Vec<String>,
    pub enabled_kinds: Vec<AgentKind>,
}

#[async_trait]
pub trait SectionPlanner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<SectionPlan, ApiError>;
}

/// Returns a fixed list of sections; used for manual plans and tests.
pub struct StaticSectionPlanner {
    sections: Vec<Section>,
}

impl StaticSectionPlanner {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }
}

#[async_trait]
impl SectionPlanner for StaticSectionPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<SectionPlan, ApiError> {
        let plan = SectionPlan {
            strategy_used: request.strategy,
            estimated_total_tokens: self.sections.iter().map(|s| s.estimated_tokens).sum(),
            sections: self.sections.clone(),
            reasoning: "Sections supplied by caller".to_string(),
            token_usage: TokenUsage::default(),
        };
        plan.validate()?;
        Ok(plan)
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "You are an API test planning assistant. Read the attached \
API documentation and split it into sections that can be tested independently. Reply with a \
single JSON object with the keys strategy_used, estimated_total_tokens, analysis_reasoning and \
sections_summary. Each entry of sections_summary has section_id, name, description, endpoints \
(objects with path, method, summary, tags), test_cases (objects with name, test_type, priority, \
description) and estimated_tokens. test_type is one of functional, integration, negative, \
security, performance, boundary. priority is one of high, medium, low.";

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    strategy_used: Option<SectioningStrategy>,
    #[serde(default)]
    estimated_total_tokens: u64,
    #[serde(default)]
    analysis_reasoning: String,
    #[serde(default)]
    sections_summary: Vec<Section>,
}

/// Asks the completion service for a plan; any failure yields `SectionPlan::fallback`.
pub struct LlmSectionPlanner {
    client: Arc<dyn ModelProviderClient>,
}

impl LlmSectionPlanner {
    pub fn new(client: Arc<dyn ModelProviderClient>) -> Self {
        Self { client }
    }

    fn analysis_request(request: &PlanRequest) -> String {
        let mark = |kind: AgentKind| {
            if request.enabled_kinds.contains(&kind) {
                "yes"
            } else {
                "no"
            }
        };
        let mut parts = vec![
            "## Analysis Request".to_string(),
            String::new(),
            format!("**Sectioning Strategy**: {}", request.strategy),
            format!(
                "**Max Tokens per Section**: {}",
                request.max_tokens_per_section
            ),
            String::new(),
        ];
        if let Some(focus) = &request.focus {
            parts.push("**User Instructions:**".to_string());
            parts.push(focus.clone());
            parts.push(String::new());
        }
        parts.push("**Required Outputs:**".to_string());
        parts.push(format!("- Tabular test cases: {}", mark(AgentKind::Tabular)));
        parts.push(format!("- Scenario features: {}", mark(AgentKind::Scenario)));
        parts.push(format!("- Request collection: {}", mark(AgentKind::Collection)));
        parts.push(String::new());
        parts.push(
            "Please analyze the provided documentation and create an optimal sectioning plan."
                .to_string(),
        );
        parts.join("\n")
    }

    async fn request_plan(&self, request: &PlanRequest) -> Result<SectionPlan, ApiError> {
        let messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(Self::analysis_request(request))
                .with_files(request.file_ids.clone()),
        ];
        let (value, usage) = complete_json(self.client.as_ref(), messages, None).await?;
        let raw: RawPlan = serde_json::from_value(value)
            .map_err(|e| ApiError::Planning(format!("Malformed plan: {}", e)))?;

        let plan = SectionPlan {
            strategy_used: raw.strategy_used.unwrap_or(request.strategy),
            estimated_total_tokens: raw.estimated_total_tokens,
            sections: raw.sections_summary,
            reasoning: raw.analysis_reasoning,
            token_usage: usage,
        };
        plan.validate()?;
        Ok(plan)
    }
}

#[async_trait]
impl SectionPlanner for LlmSectionPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<SectionPlan, ApiError> {
        match self.request_plan(request).await {
            Ok(plan) => {
                info!(
                    sections = plan.sections.len(),
                    strategy = %plan.strategy_used,
                    "Section analysis completed"
                );
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "Section analysis failed, using single fallback section");
                Ok(SectionPlan::fallback(request.max_tokens_per_section))
            }
        }
    }
}
