//! Generator Agents
//!
//! One capability trait, `GeneratorAgent`, with a variant per artifact kind plus a
//! Null-Object variant. The scheduler looks variants up by kind through `AgentRegistry`.
//! The collection variant is stateful: its output carries a contribution that the
//! scheduler routes into the run's `CollectionConsolidator`.

pub mod collection;
pub mod null;
pub mod registry;
pub mod scenario;
pub mod tabular;

pub use collection::CollectionAgent;
pub use null::NullAgent;
pub use registry::AgentRegistry;
pub use scenario::ScenarioAgent;
pub use tabular::TabularAgent;

use crate::consolidator::CollectionContribution;
use crate::error::ApiError;
use crate::provider::{complete_json, ChatMessage, ModelProviderClient};
use crate::section::Section;
use crate::types::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Artifact kinds, in the order a section runs them sequentially
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Tabular,
    Scenario,
    Collection,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Tabular, AgentKind::Scenario, AgentKind::Collection];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Tabular => "tabular",
            AgentKind::Scenario => "scenario",
            AgentKind::Collection => "collection",
        }
    }

    /// Stateful kinds contribute to a shared aggregate and run strictly in section order.
    pub fn is_stateful(&self) -> bool {
        matches!(self, AgentKind::Collection)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tabular" | "csv" => Ok(AgentKind::Tabular),
            "scenario" | "feature" => Ok(AgentKind::Scenario),
            "collection" | "postman" => Ok(AgentKind::Collection),
            other => Err(ApiError::Validation(format!("Unknown artifact kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularPayload {
    pub row_count: usize,
    pub headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPayload {
    pub scenario_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_file: Option<PathBuf>,
    /// Companion test-data files referenced by the feature
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPayload {
    pub request_count: usize,
    pub folder_name: String,
    pub variables_count: usize,
    /// Present until the scheduler hands it to the consolidator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution: Option<CollectionContribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_file: Option<PathBuf>,
}

/// Kind-specific part of an output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactPayload {
    Tabular(TabularPayload),
    Scenario(ScenarioPayload),
    Collection(CollectionPayload),
    Null,
}

impl ArtifactPayload {
    /// Kind this payload belongs to; `None` for the null payload.
    pub fn kind(&self) -> Option<AgentKind> {
        match self {
            ArtifactPayload::Tabular(_) => Some(AgentKind::Tabular),
            ArtifactPayload::Scenario(_) => Some(AgentKind::Scenario),
            ArtifactPayload::Collection(_) => Some(AgentKind::Collection),
            ArtifactPayload::Null => None,
        }
    }

    /// Empty payload of the given kind, used for failed outputs.
    pub fn empty(kind: AgentKind) -> Self {
        match kind {
            AgentKind::Tabular => ArtifactPayload::Tabular(TabularPayload::default()),
            AgentKind::Scenario => ArtifactPayload::Scenario(ScenarioPayload::default()),
            AgentKind::Collection => ArtifactPayload::Collection(CollectionPayload::default()),
        }
    }

    /// Test cases, scenarios or requests this payload counts.
    pub fn item_count(&self) -> usize {
        match self {
            ArtifactPayload::Tabular(p) => p.row_count,
            ArtifactPayload::Scenario(p) => p.scenario_count,
            ArtifactPayload::Collection(p) => p.request_count,
            ArtifactPayload::Null => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMetrics {
    pub duration_secs: f64,
    pub token_usage: TokenUsage,
}

/// Result of one (section, kind) task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactOutput {
    pub agent_kind: AgentKind,
    pub section_id: String,
    pub success: bool,
    pub artifact_paths: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: OutputMetrics,
    pub metadata: Map<String, Value>,
    pub payload: ArtifactPayload,
}

impl ArtifactOutput {
    pub fn succeeded(kind: AgentKind, section_id: impl Into<String>, payload: ArtifactPayload) -> Self {
        Self {
            agent_kind: kind,
            section_id: section_id.into(),
            success: true,
            artifact_paths: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: OutputMetrics::default(),
            metadata: Map::new(),
            payload,
        }
    }

    pub fn failed(kind: AgentKind, section_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::succeeded(kind, section_id, ArtifactPayload::empty(kind))
        }
    }

    /// Append an error and flip the output to failed.
    pub fn fail_with(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.metrics.token_usage = usage;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Run-wide inputs every generator sees
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub run_id: String,
    /// Service-side ids of the uploaded inputs
    pub file_ids: Vec<String>,
    pub focus: Option<String>,
    /// Output root; each kind writes into its own subdirectory
    pub output_dir: PathBuf,
    pub generate_documentation: bool,
    /// `%Y%m%d_%H%M%S`, shared by every file of the run
    pub timestamp: String,
}

#[async_trait]
pub trait GeneratorAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Produce the artifact for one section. An `Err` becomes a failed output.
    async fn generate(
        &self,
        ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError>;
}

/// System prompt + section context (with input files attached) as one JSON-mode call.
pub(crate) async fn request_section_json(
    client: &dyn ModelProviderClient,
    system_prompt: &str,
    ctx: &GenerationContext,
    section: &Section,
) -> Result<(Value, TokenUsage), ApiError> {
    let mut user = section.context_text();
    if let Some(focus) = &ctx.focus {
        user.push_str(&format!("\n\n**Focus:** {}", focus));
    }
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user).with_files(ctx.file_ids.clone()),
    ];
    complete_json(client, messages, None).await
}

/// Lowercase, underscore-separated file stem.
pub(crate) fn clean_file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_sep && !stem.is_empty() {
                stem.push('_');
            }
            pending_sep = false;
            stem.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_sep = true;
        }
    }
    let stem = stem.trim_matches('_').to_string();
    if stem.is_empty() {
        "api_tests".to_string()
    } else {
        stem
    }
}

/// One CSV record; fields with separators, quotes or line breaks are quoted.
pub(crate) fn csv_row(cells: impl IntoIterator<Item = String>) -> String {
    cells
        .into_iter()
        .map(|field| {
            if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Read a JSON value as display text; arrays become one item per line.
pub(crate) fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| value_text(Some(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, value_text(Some(v))))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}
