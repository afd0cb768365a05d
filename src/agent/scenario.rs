//! Scenario generator: Gherkin feature files (Karate DSL) per section.

use super::{
    clean_file_stem, csv_row, request_section_json, value_text, AgentKind, ArtifactOutput,
    ArtifactPayload, GenerationContext, GeneratorAgent, ScenarioPayload,
};
use crate::error::ApiError;
use crate::provider::ModelProviderClient;
use crate::section::Section;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SCENARIO_DIR: &str = "scenario";

const SYSTEM_PROMPT: &str = "You write Karate DSL 1.4 feature files for API testing. For the \
section below produce a JSON object with feature_file and metadata. feature_file has \
feature_title, feature_description, background (list of step strings) and scenarios; each \
scenario has name, description, tags, steps (list of step strings) and optionally examples \
(list of table rows such as '| id | status |'). Optionally add data_files, a list of objects \
with filename (.json, .csv or .yaml) and content, for data the scenarios read. Generate at least \
one scenario per suggested test case plus edge cases, and cover every endpoint.";

/// Keywords a runnable feature file is expected to contain
const FEATURE_KEYWORDS: [(&str, &str); 5] = [
    ("Feature:", "feature declaration"),
    ("Scenario", "scenario"),
    ("Given", "setup steps"),
    ("When", "action steps"),
    ("Then", "assertion steps"),
];

#[derive(Debug, Default, Deserialize)]
struct FeatureSpec {
    #[serde(default)]
    feature_title: Option<String>,
    #[serde(default)]
    feature_description: Option<String>,
    #[serde(default)]
    background: Vec<String>,
    #[serde(default)]
    scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ScenarioSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    steps: Vec<serde_json::Value>,
    #[serde(default)]
    examples: Vec<String>,
}

pub struct ScenarioAgent {
    client: Arc<dyn ModelProviderClient>,
}

impl ScenarioAgent {
    pub fn new(client: Arc<dyn ModelProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GeneratorAgent for ScenarioAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Scenario
    }

    async fn generate(
        &self,
        ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        let (value, usage) =
            request_section_json(self.client.as_ref(), SYSTEM_PROMPT, ctx, section).await?;

        let feature: FeatureSpec = match value.get("feature_file") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                ApiError::Generation(format!("Scenario feature generation failed: {}", e))
            })?,
            None => FeatureSpec::default(),
        };
        let title = feature
            .feature_title
            .clone()
            .unwrap_or_else(|| format!("{} API Tests", section.name));
        debug!(section_id = %section.id, scenarios = feature.scenarios.len(), "Rendering feature");

        let dir = ctx.output_dir.join(SCENARIO_DIR);
        let stem = format!("{}_{}", clean_file_stem(&section.id), ctx.timestamp);
        let feature_path = dir.join(format!("{}.feature", stem));
        write_text(&feature_path, &render_feature(&title, &feature))?;

        let mut warnings = Vec::new();
        let mut data_files = Vec::new();
        let raw_data_files = value
            .get("data_files")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for (i, raw) in raw_data_files.iter().enumerate() {
            match data_file_from(raw, &stem, i + 1) {
                Some(data) => data_files.push(write_data_file(&dir, &data)?),
                None => warnings.push(format!(
                    "Skipped data file {} of section {}: unsupported entry",
                    i + 1,
                    section.id
                )),
            }
        }

        let check = check_feature_file(&feature_path)?;
        if !check.missing.is_empty() {
            warnings.push(format!("Feature file is missing {}", check.missing.join(", ")));
        }
        if check.scenarios == 0 {
            warn!(section_id = %section.id, "Feature file has no scenarios");
            warnings.push("Feature file contains no scenarios".to_string());
        }

        let mut output = ArtifactOutput::succeeded(
            AgentKind::Scenario,
            section.id.clone(),
            ArtifactPayload::Scenario(ScenarioPayload {
                scenario_count: feature.scenarios.len(),
                feature_file: Some(feature_path.clone()),
                data_files: data_files.clone(),
            }),
        )
        .with_usage(usage)
        .with_metadata("feature_title", title.clone())
        .with_metadata("section_name", section.name.clone())
        .with_metadata("scenarios_expected", section.test_cases.len())
        .with_metadata("validation_passed", check.passed())
        .with_metadata("documentation_generated", ctx.generate_documentation);
        output.artifact_paths.push(feature_path);
        output.artifact_paths.extend(data_files);
        output.warnings.extend(warnings);

        if feature.scenarios.len() < section.test_cases.len() {
            output.warnings.push(format!(
                "Section {} produced {} scenarios for {} suggested test cases",
                section.id,
                feature.scenarios.len(),
                section.test_cases.len()
            ));
        }

        if ctx.generate_documentation {
            let doc_path = dir.join(format!("{}_README.md", stem));
            write_text(&doc_path, &render_readme(&title, &feature, section))?;
            output.artifact_paths.push(doc_path);
        }

        info!(
            section_id = %section.id,
            scenarios = feature.scenarios.len(),
            "Feature file written"
        );
        Ok(output)
    }
}

fn write_text(path: &Path, content: &str) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ApiError::Generation(format!("Failed to create {:?}: {}", parent, e)))?;
    }
    fs::write(path, content)
        .map_err(|e| ApiError::Generation(format!("Failed to write {:?}: {}", path, e)))
}

/// One companion data file, ready to write
#[derive(Debug, PartialEq)]
struct DataFile {
    file_name: String,
    content: Value,
}

/// Accepts `{filename, content}` objects or bare strings. Content given as text is parsed
/// as JSON when possible and wrapped as `{"data": text}` otherwise.
fn data_file_from(raw: &Value, stem: &str, number: usize) -> Option<DataFile> {
    let default_name = || format!("{}_data_{}.json", stem, number);
    let (name, content) = match raw {
        Value::Object(map) => (
            map.get("filename")
                .and_then(Value::as_str)
                .and_then(|name| Path::new(name).file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(default_name),
            map.get("content").cloned().unwrap_or_else(|| json!({})),
        ),
        Value::String(text) => (default_name(), Value::String(text.clone())),
        _ => return None,
    };
    let content = match content {
        Value::String(text) if text.trim().is_empty() => json!({}),
        Value::String(text) => {
            serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "data": text }))
        }
        other => other,
    };
    Some(DataFile {
        file_name: name,
        content,
    })
}

fn write_data_file(dir: &Path, data: &DataFile) -> Result<PathBuf, ApiError> {
    let path = dir.join(&data.file_name);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let body = match extension.as_str() {
        "csv" => render_data_csv(&data.content),
        // JSON is a YAML subset, so structured content is written as-is.
        "yaml" | "yml" => match &data.content {
            Value::String(text) => text.clone(),
            other => pretty_json(other)?,
        },
        _ => pretty_json(&data.content)?,
    };
    write_text(&path, &body)?;
    debug!(path = %path.display(), "Data file written");
    Ok(path)
}

fn pretty_json(value: &Value) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::Generation(format!("Failed to serialize data file: {}", e)))
}

/// Rows of objects become a table keyed by the first row; anything else is one `data` cell.
fn render_data_csv(content: &Value) -> String {
    let rows = content.as_array().filter(|rows| !rows.is_empty());
    let headers: Vec<String> = rows
        .and_then(|rows| rows[0].as_object())
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();
    if headers.is_empty() {
        let cell = match content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return format!("data\r\n{}\r\n", csv_row([cell]));
    }

    let mut body = csv_row(headers.iter().cloned());
    body.push_str("\r\n");
    for row in rows.into_iter().flatten() {
        body.push_str(&csv_row(headers.iter().map(|h| value_text(row.get(h)))));
        body.push_str("\r\n");
    }
    body
}

/// Result of reading a written feature file back
#[derive(Debug, PartialEq)]
struct FeatureCheck {
    scenarios: usize,
    missing: Vec<&'static str>,
}

impl FeatureCheck {
    fn passed(&self) -> bool {
        self.scenarios > 0
    }
}

fn check_feature_file(path: &Path) -> Result<FeatureCheck, ApiError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ApiError::Generation(format!("Failed to read back {:?}: {}", path, e)))?;
    Ok(check_feature(&content))
}

fn check_feature(content: &str) -> FeatureCheck {
    let missing = FEATURE_KEYWORDS
        .iter()
        .filter(|(keyword, _)| !content.contains(keyword))
        .map(|(_, description)| *description)
        .collect();
    let scenarios = content
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("Scenario:") || line.starts_with("Scenario Outline:"))
        .count();
    FeatureCheck { scenarios, missing }
}

fn render_feature(title: &str, feature: &FeatureSpec) -> String {
    let mut lines = vec![
        format!("Feature: {}", title),
        String::new(),
        format!(
            "  {}",
            feature
                .feature_description
                .as_deref()
                .unwrap_or("Comprehensive API testing scenarios")
        ),
        String::new(),
    ];

    if !feature.background.is_empty() {
        lines.push("  Background:".to_string());
        lines.extend(feature.background.iter().map(|step| format!("    {}", step)));
        lines.push(String::new());
    }

    for (i, scenario) in feature.scenarios.iter().enumerate() {
        lines.extend(render_scenario(scenario, i + 1));
        lines.push(String::new());
    }
    lines.join("\n")
}

fn render_scenario(scenario: &ScenarioSpec, number: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if !scenario.tags.is_empty() {
        let tags: Vec<String> = scenario
            .tags
            .iter()
            .map(|t| format!("@{}", t.trim_start_matches('@')))
            .collect();
        lines.push(format!("  {}", tags.join(" ")));
    }

    let name = scenario
        .name
        .clone()
        .unwrap_or_else(|| format!("Test Scenario {}", number));
    let has_examples = scenario.examples.iter().any(|row| !row.trim().is_empty());
    if has_examples {
        lines.push(format!("  Scenario Outline: {}", name));
    } else {
        lines.push(format!("  Scenario: {}", name));
    }

    if let Some(description) = scenario.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("    # {}", description));
    }

    lines.extend(
        scenario
            .steps
            .iter()
            .map(|step| format!("    {}", value_text(Some(step)))),
    );

    if has_examples {
        lines.push(String::new());
        lines.push("    Examples:".to_string());
        lines.extend(
            scenario
                .examples
                .iter()
                .filter(|row| !row.trim().is_empty() && !row.trim_start().starts_with('#'))
                .map(|row| format!("      {}", row.trim())),
        );
    }
    lines
}

fn render_readme(title: &str, feature: &FeatureSpec, section: &Section) -> String {
    let mut doc = vec![
        format!("# {} - Feature Documentation", title),
        String::new(),
        "## Overview".to_string(),
        String::new(),
        format!("- **Section**: {}", section.name),
        format!("- **Total Scenarios**: {}", feature.scenarios.len()),
        format!("- **Endpoints Covered**: {}", section.endpoints.len()),
        "- **Framework**: Karate 1.4.x".to_string(),
        String::new(),
        "## Scenarios".to_string(),
        String::new(),
    ];
    for (i, scenario) in feature.scenarios.iter().enumerate() {
        let name = scenario.name.as_deref().unwrap_or("Unnamed scenario");
        doc.push(format!("{}. {}", i + 1, name));
    }
    doc.extend([
        String::new(),
        "## Running".to_string(),
        String::new(),
        "```bash".to_string(),
        "mvn test -Dkarate.options=\"classpath:features\"".to_string(),
        "```".to_string(),
    ]);
    doc.join("\n")
}
