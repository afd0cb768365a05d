//! Run composition root.
//!
//! `Orchestrator` owns every collaborator of a run and drives the four phases:
//! acquire inputs, plan sections, schedule generators, compile the report. Only the
//! first two phases can abort a run; their errors become an error report.

use crate::agent::{AgentKind, AgentRegistry, GenerationContext};
use crate::cache::{ContentCache, DEFAULT_PURPOSE};
use crate::config::{GenerationConfig, SmithConfig};
use crate::consolidator::CollectionConsolidator;
use crate::error::ApiError;
use crate::provider::ProviderFactory;
use crate::report::{OutputsByKind, ResultCompiler, RunContext, RunReport};
use crate::scheduler::{ExecutionMode, ExecutionScheduler, SchedulerOptions};
use crate::section::{LlmSectionPlanner, PlanRequest, SectionPlan, SectionPlanner, SectioningStrategy};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Per-run choices supplied by the caller
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub spec_paths: Vec<PathBuf>,
    pub focus: Option<String>,
    pub strategy: SectioningStrategy,
    pub enabled_kinds: Vec<AgentKind>,
    pub mode: ExecutionMode,
    /// Overrides `output.directory`
    pub output_dir: Option<PathBuf>,
    /// Overrides `generation.generate_documentation`
    pub generate_documentation: Option<bool>,
}

impl RunOptions {
    pub fn new(spec_paths: Vec<PathBuf>) -> Self {
        Self {
            spec_paths,
            focus: None,
            strategy: SectioningStrategy::default(),
            enabled_kinds: AgentKind::ALL.to_vec(),
            mode: ExecutionMode::default(),
            output_dir: None,
            generate_documentation: None,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<AgentKind>) -> Self {
        self.enabled_kinds = kinds;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SectioningStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

pub struct Orchestrator {
    cache: Arc<ContentCache>,
    planner: Arc<dyn SectionPlanner>,
    registry: Arc<AgentRegistry>,
    compiler: ResultCompiler,
    generation: GenerationConfig,
    output_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<ContentCache>,
        planner: Arc<dyn SectionPlanner>,
        registry: Arc<AgentRegistry>,
        generation: GenerationConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            planner,
            registry,
            compiler: ResultCompiler::new(),
            generation,
            output_dir: output_dir.into(),
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &SmithConfig) -> Result<Self, ApiError> {
        config.validate_or_error()?;
        let (client, uploader) = ProviderFactory::create(&config.provider)?;
        let cache = ContentCache::open(
            config.cache.resolved_registry_path(),
            config.files.clone(),
            uploader,
        )?;
        let planner: Arc<dyn SectionPlanner> = Arc::new(LlmSectionPlanner::new(client.clone()));
        let registry = AgentRegistry::with_defaults(client);
        Ok(Self::new(
            Arc::new(cache),
            planner,
            Arc::new(registry),
            config.generation.clone(),
            config.output.directory.clone(),
        ))
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    #[instrument(skip(self, options), fields(specs = options.spec_paths.len(), mode = %options.mode))]
    pub async fn run(&self, options: &RunOptions) -> RunReport {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let output_dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.clone());
        let generate_documentation = options
            .generate_documentation
            .unwrap_or(self.generation.generate_documentation);

        let mut context = RunContext {
            input_files: options.spec_paths.clone(),
            focus: options.focus.clone(),
            strategy: options.strategy,
            sections_planned: 0,
        };

        info!(run_id = %run_id, "Starting run");

        let (file_ids, plan) = match self.prepare(options, &output_dir).await {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Run aborted before scheduling");
                return self
                    .compiler
                    .create_error_result(&run_id, &context, &err, started.elapsed());
            }
        };
        context.strategy = plan.strategy_used;
        context.sections_planned = plan.sections.len();

        info!(
            run_id = %run_id,
            sections = plan.sections.len(),
            strategy = %plan.strategy_used,
            "Plan ready"
        );

        let ctx = GenerationContext {
            run_id: run_id.clone(),
            file_ids,
            focus: options.focus.clone(),
            output_dir: output_dir.clone(),
            generate_documentation,
            timestamp: timestamp.clone(),
        };
        let scheduler = ExecutionScheduler::new(
            self.registry.clone(),
            SchedulerOptions::new(
                self.generation.max_concurrent_agents,
                self.generation.agent_timeout_secs,
            ),
        );
        let mut consolidator = CollectionConsolidator::new(&output_dir, generate_documentation);
        let base_name = format!("api_collection_{}", timestamp);

        let scheduled = scheduler
            .run(
                &ctx,
                &plan.sections,
                &options.enabled_kinds,
                options.mode,
                &mut consolidator,
                &base_name,
            )
            .await;

        self.compiler.compile(
            &run_id,
            &context,
            OutputsByKind::from_outputs(scheduled.into_outputs()),
            started.elapsed(),
        )
    }

    /// Acquire every input and produce a validated plan.
    async fn prepare(
        &self,
        options: &RunOptions,
        output_dir: &std::path::Path,
    ) -> Result<(Vec<String>, SectionPlan), ApiError> {
        if options.spec_paths.is_empty() {
            return Err(ApiError::Validation("At least one input file is required".to_string()));
        }
        if options.enabled_kinds.is_empty() {
            return Err(ApiError::Validation("No artifact kinds enabled".to_string()));
        }

        let mut file_ids = Vec::with_capacity(options.spec_paths.len());
        for path in &options.spec_paths {
            let entry = self.cache.acquire(path, DEFAULT_PURPOSE).await?;
            file_ids.push(entry.reference_id);
        }

        let request = PlanRequest {
            strategy: options.strategy,
            focus: options.focus.clone(),
            max_tokens_per_section: self.generation.max_tokens_per_section,
            file_ids: file_ids.clone(),
            enabled_kinds: options.enabled_kinds.clone(),
        };
        let plan = self.planner.plan(&request).await?;
        plan.validate()?;

        std::fs::create_dir_all(output_dir)?;
        Ok((file_ids, plan))
    }
}
