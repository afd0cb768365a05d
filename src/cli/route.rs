//! CLI route: single route table and command context. Dispatches to domain services and presentation.

use crate::agent::AgentKind;
use crate::cache::registry::FileRegistry;
use crate::cache::ContentCache;
use crate::config::{ConfigLoader, SmithConfig};
use crate::error::ApiError;
use crate::provider::FileUploader;
use crate::run::{Orchestrator, RunOptions};
use crate::scheduler::ExecutionMode;
use crate::section::SectioningStrategy;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::cli::command_name;
use crate::cli::output::CommandOutput;
use crate::cli::parse::{CacheCommands, Commands};
use crate::cli::presentation::{
    format_cache_stats, format_cleanup_report, format_report_json, format_report_text,
    format_status, StatusView,
};

/// Runtime context for CLI execution: workspace root and the resolved configuration.
pub struct CommandContext {
    config: SmithConfig,
    workspace_root: PathBuf,
}

impl CommandContext {
    /// Load configuration from `config_path` if given, else the layered sources.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self {
            config,
            workspace_root,
        })
    }

    pub fn config(&self) -> &SmithConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        info!(command = %name, "Command started");
        let result = self.execute_inner(command);
        info!(
            command = %name,
            ok = result.as_ref().map(|o| o.success).unwrap_or(false),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        match command {
            Commands::Generate {
                specs,
                focus,
                output,
                strategy,
                no_tabular,
                no_scenario,
                no_collection,
                parallel: _,
                sequential,
                only,
                no_docs,
                format,
            } => {
                let mut options = RunOptions::new(specs.clone())
                    .with_strategy(strategy.parse::<SectioningStrategy>()?)
                    .with_kinds(enabled_kinds(
                        only.as_deref(),
                        *no_tabular,
                        *no_scenario,
                        *no_collection,
                    )?)
                    .with_mode(if *sequential {
                        ExecutionMode::Sequential
                    } else {
                        ExecutionMode::Parallel
                    });
                options.focus = focus.clone();
                options.output_dir = output.clone();
                if *no_docs {
                    options.generate_documentation = Some(false);
                }
                self.handle_generate(&options, format)
            }
            Commands::Status { format } => {
                let registry = FileRegistry::load_from_disk(&self.config.cache.resolved_registry_path());
                let view = StatusView::from_config(&self.config, registry.len());
                Ok(CommandOutput::ok(format_status(&view, format)?))
            }
            Commands::Cache { command } => self.handle_cache_command(command),
        }
    }

    fn handle_generate(&self, options: &RunOptions, format: &str) -> Result<CommandOutput, ApiError> {
        let orchestrator = Orchestrator::from_config(&self.config)?;
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        let report = rt.block_on(orchestrator.run(options));

        let text = if format == "json" {
            format_report_json(&report)?
        } else {
            format_report_text(&report)
        };
        Ok(CommandOutput {
            text,
            success: report.success,
        })
    }

    fn handle_cache_command(&self, command: &CacheCommands) -> Result<CommandOutput, ApiError> {
        let cache = ContentCache::open(
            self.config.cache.resolved_registry_path(),
            self.config.files.clone(),
            Arc::new(MaintenanceUploader),
        )?;
        match command {
            CacheCommands::Stats { format } => Ok(CommandOutput::ok(format_cache_stats(
                &cache.stats(),
                cache.registry_path(),
                format,
            )?)),
            CacheCommands::Cleanup { format } => {
                let report = cache.cleanup()?;
                Ok(CommandOutput::ok(format_cleanup_report(&report, format)?))
            }
        }
    }
}

/// Resolve `--only` / `--no-*` flags into the enabled kinds, in canonical order.
pub fn enabled_kinds(
    only: Option<&str>,
    no_tabular: bool,
    no_scenario: bool,
    no_collection: bool,
) -> Result<Vec<AgentKind>, ApiError> {
    if let Some(kind) = only {
        return Ok(vec![kind.parse::<AgentKind>()?]);
    }
    let kinds: Vec<AgentKind> = AgentKind::ALL
        .iter()
        .copied()
        .filter(|kind| match kind {
            AgentKind::Tabular => !no_tabular,
            AgentKind::Scenario => !no_scenario,
            AgentKind::Collection => !no_collection,
        })
        .collect();
    if kinds.is_empty() {
        return Err(ApiError::Validation(
            "Every artifact kind is disabled; nothing to generate".to_string(),
        ));
    }
    Ok(kinds)
}

/// Cache maintenance never uploads.
struct MaintenanceUploader;

#[async_trait]
impl FileUploader for MaintenanceUploader {
    async fn upload(&self, path: &Path, _purpose: &str) -> Result<String, ApiError> {
        Err(ApiError::Upload(format!(
            "cache maintenance cannot upload {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_kinds_from_flags() {
        assert_eq!(
            enabled_kinds(None, false, false, false).unwrap(),
            AgentKind::ALL.to_vec()
        );
        assert_eq!(
            enabled_kinds(None, false, true, false).unwrap(),
            vec![AgentKind::Tabular, AgentKind::Collection]
        );
        assert_eq!(
            enabled_kinds(Some("postman"), false, false, false).unwrap(),
            vec![AgentKind::Collection]
        );
        assert!(enabled_kinds(None, true, true, true).is_err());
        assert!(enabled_kinds(Some("pdf"), false, false, false).is_err());
    }
}
