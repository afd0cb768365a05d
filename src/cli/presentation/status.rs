//! Status presentation: the resolved configuration, with secrets redacted.

use super::shared::{format_section_heading, to_json_pretty};
use crate::config::SmithConfig;
use crate::error::ApiError;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub provider_type: String,
    pub model: String,
    pub api_key_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_concurrent_agents: usize,
    pub agent_timeout_secs: u64,
    pub max_tokens_per_section: u32,
    pub generate_documentation: bool,
    pub max_file_size_mb: u64,
    pub supported_file_types: Vec<String>,
    pub registry_path: PathBuf,
    pub cached_files: usize,
    pub output_directory: PathBuf,
    pub validation_errors: Vec<String>,
}

impl StatusView {
    pub fn from_config(config: &SmithConfig, cached_files: usize) -> Self {
        let validation_errors = match config.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        };
        Self {
            provider_type: config.provider.provider_type.as_str().to_string(),
            model: config.provider.model.clone(),
            api_key_set: config.provider.api_key.is_some(),
            base_url: config.provider.base_url.clone(),
            max_concurrent_agents: config.generation.max_concurrent_agents,
            agent_timeout_secs: config.generation.agent_timeout_secs,
            max_tokens_per_section: config.generation.max_tokens_per_section,
            generate_documentation: config.generation.generate_documentation,
            max_file_size_mb: config.files.max_file_size_mb,
            supported_file_types: config.files.supported_file_types.clone(),
            registry_path: config.cache.resolved_registry_path(),
            cached_files,
            output_directory: config.output.directory.clone(),
            validation_errors,
        }
    }
}

pub fn format_status(view: &StatusView, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json_pretty(view);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Setting", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("provider", view.provider_type.clone()),
        ("model", view.model.clone()),
        ("api key", if view.api_key_set { "set" } else { "missing" }.to_string()),
        (
            "base url",
            view.base_url.clone().unwrap_or_else(|| "(default endpoint)".to_string()),
        ),
        ("max concurrent agents", view.max_concurrent_agents.to_string()),
        ("agent timeout", format!("{}s", view.agent_timeout_secs)),
        ("tokens per section", view.max_tokens_per_section.to_string()),
        ("documentation", view.generate_documentation.to_string()),
        ("max file size", format!("{} MB", view.max_file_size_mb)),
        ("file types", view.supported_file_types.join(" ")),
        ("cache registry", view.registry_path.display().to_string()),
        ("cached files", view.cached_files.to_string()),
        ("output directory", view.output_directory.display().to_string()),
    ];
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value]);
    }

    let mut out = format!("{}\n\n{}\n", format_section_heading("Configuration"), table);
    if !view.validation_errors.is_empty() {
        out.push_str(&format!("\nProblems ({}):", view.validation_errors.len()));
        for e in &view.validation_errors {
            out.push_str(&format!("\n  - {}", e));
        }
    }
    Ok(out)
}
