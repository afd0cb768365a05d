//! Tabular generator: QMetry-compatible CSV test cases per section.

use super::{
    clean_file_stem, csv_row, request_section_json, value_text, AgentKind, ArtifactOutput,
    ArtifactPayload, GenerationContext, GeneratorAgent, TabularPayload,
};
use crate::error::ApiError;
use crate::provider::ModelProviderClient;
use crate::section::Section;
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const TABULAR_DIR: &str = "tabular";

pub const DEFAULT_HEADERS: [&str; 12] = [
    "Test Case ID",
    "Test Case Name",
    "Test Case Description",
    "Module",
    "Test Type",
    "Priority",
    "Estimated Time (mins)",
    "Preconditions",
    "Test Steps",
    "Expected Results",
    "Test Data",
    "Tags",
];

const REQUIRED_HEADERS: [&str; 4] = [
    "Test Case ID",
    "Test Case Name",
    "Test Steps",
    "Expected Results",
];

const SYSTEM_PROMPT: &str = "You write QMetry-compatible API test cases. For the section below \
produce a JSON object with a test_cases array and a metadata object. Each test case has \
test_case_id (TC_<SECTION>_<NUMBER>), test_case_name, test_case_description, module, test_type \
(Functional, Integration, Negative, Security, Performance, Boundary), priority (High, Medium, \
Low), estimated_time, preconditions, test_steps, expected_results, test_data and tags. Aim for \
at least 70% endpoint coverage. metadata may contain coverage_summary and csv_headers.";

pub struct TabularAgent {
    client: Arc<dyn ModelProviderClient>,
}

impl TabularAgent {
    pub fn new(client: Arc<dyn ModelProviderClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GeneratorAgent for TabularAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Tabular
    }

    async fn generate(
        &self,
        ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        let (value, usage) =
            request_section_json(self.client.as_ref(), SYSTEM_PROMPT, ctx, section).await?;

        let test_cases = value
            .get("test_cases")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let headers = headers_from(value.get("metadata"));

        let path = ctx
            .output_dir
            .join(TABULAR_DIR)
            .join(format!(
                "test_cases_{}_{}.csv",
                clean_file_stem(&section.id),
                ctx.timestamp
            ));
        write_csv(&path, &headers, &test_cases)
            .map_err(|e| ApiError::Generation(format!("CSV processing failed: {}", e)))?;

        let mut output = ArtifactOutput::succeeded(
            AgentKind::Tabular,
            section.id.clone(),
            ArtifactPayload::Tabular(TabularPayload {
                row_count: test_cases.len(),
                headers: headers.clone(),
                csv_file: Some(path.clone()),
            }),
        )
        .with_usage(usage)
        .with_metadata("section_name", section.name.clone())
        .with_metadata("endpoints_processed", section.endpoints.len());
        output.artifact_paths.push(path);

        if let Some(problem) = check_csv(&headers, test_cases.len()) {
            warn!(section_id = %section.id, %problem, "Generated CSV failed validation");
            output.warnings.push(format!("Generated CSV failed validation: {}", problem));
        }

        info!(
            section_id = %section.id,
            rows = test_cases.len(),
            "Tabular test cases written"
        );
        Ok(output)
    }
}

fn headers_from(metadata: Option<&Value>) -> Vec<String> {
    metadata
        .and_then(|m| m.get("csv_headers"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|headers| !headers.is_empty())
        .unwrap_or_else(|| DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect())
}

fn check_csv(headers: &[String], rows: usize) -> Option<String> {
    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == required))
        .collect();
    if !missing.is_empty() {
        return Some(format!("missing required headers: {}", missing.join(", ")));
    }
    if rows == 0 {
        return Some("no test cases".to_string());
    }
    None
}

/// Cell text for one header, with the same defaults QMetry import expects.
fn cell(test_case: &Value, header: &str) -> String {
    let field = |key: &str| value_text(test_case.get(key));
    let or = |text: String, default: &str| {
        if text.is_empty() {
            default.to_string()
        } else {
            text
        }
    };
    match header {
        "Test Case ID" => field("test_case_id"),
        "Test Case Name" => field("test_case_name"),
        "Test Case Description" => field("test_case_description"),
        "Module" => or(field("module"), "API Tests"),
        "Test Type" => or(field("test_type"), "Functional"),
        "Priority" => or(field("priority"), "Medium"),
        "Estimated Time (mins)" => or(field("estimated_time"), "15"),
        "Preconditions" => field("preconditions"),
        "Test Steps" => format_steps(test_case.get("test_steps")),
        "Expected Results" => field("expected_results"),
        "Test Data" => field("test_data"),
        "Tags" => field("tags"),
        _ => String::new(),
    }
}

fn format_steps(steps: Option<&Value>) -> String {
    match steps {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, value_text(Some(step))))
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_text(other),
    }
}

fn write_csv(path: &Path, headers: &[String], test_cases: &[Value]) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = String::new();
    body.push_str(&csv_row(headers.iter().cloned()));
    body.push_str("\r\n");
    for test_case in test_cases {
        body.push_str(&csv_row(headers.iter().map(|h| cell(test_case, h))));
        body.push_str("\r\n");
    }
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
