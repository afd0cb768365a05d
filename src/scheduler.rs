//! Execution scheduler: runs every (section, kind) task of a plan.
//!
//! Stateless kinds run in bounded batches whose members are polled together; a batch
//! finishes before the next starts. The stateful collection kind always runs strictly in
//! section order, feeding the consolidator through `&mut`. A task failure, panic or
//! timeout becomes one failed output and never affects its siblings.

use crate::agent::{AgentKind, AgentRegistry, ArtifactOutput, ArtifactPayload, GenerationContext};
use crate::consolidator::{validate_collection, CollectionConsolidator, ExportedCollection};
use crate::error::ApiError;
use crate::section::Section;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Sequential,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => f.write_str("parallel"),
            ExecutionMode::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(ExecutionMode::Parallel),
            "sequential" => Ok(ExecutionMode::Sequential),
            other => Err(ApiError::Validation(format!("Unknown execution mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Upper bound on stateless tasks in flight at once
    pub max_concurrent: usize,
    /// Per-task limit; `None` waits indefinitely
    pub task_timeout: Option<Duration>,
}

impl SchedulerOptions {
    pub fn new(max_concurrent: usize, timeout_secs: u64) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            task_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::new(3, 120)
    }
}

/// Every output of a run in section-major order, plus the exported bundle if any
#[derive(Debug, Clone, Default)]
pub struct ScheduledOutputs {
    pub outputs: Vec<ArtifactOutput>,
    pub exported: Option<ExportedCollection>,
}

impl ScheduledOutputs {
    pub fn of_kind(&self, kind: AgentKind) -> impl Iterator<Item = &ArtifactOutput> {
        self.outputs.iter().filter(move |o| o.agent_kind == kind)
    }

    pub fn into_outputs(self) -> Vec<ArtifactOutput> {
        self.outputs
    }
}

pub struct ExecutionScheduler {
    registry: Arc<AgentRegistry>,
    options: SchedulerOptions,
}

impl ExecutionScheduler {
    pub fn new(registry: Arc<AgentRegistry>, options: SchedulerOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    /// Run all tasks, then finalize the consolidator if any collection output exists.
    pub async fn run(
        &self,
        ctx: &GenerationContext,
        sections: &[Section],
        enabled_kinds: &[AgentKind],
        mode: ExecutionMode,
        consolidator: &mut CollectionConsolidator,
        base_name: &str,
    ) -> ScheduledOutputs {
        let mut kinds = enabled_kinds.to_vec();
        kinds.sort();
        kinds.dedup();

        info!(
            sections = sections.len(),
            kinds = ?kinds,
            %mode,
            max_concurrent = self.options.max_concurrent,
            "Scheduling generation tasks"
        );

        let mut outputs = match mode {
            ExecutionMode::Sequential => {
                self.run_sequential(ctx, sections, &kinds, consolidator).await
            }
            ExecutionMode::Parallel => {
                self.run_parallel(ctx, sections, &kinds, consolidator).await
            }
        };

        let exported = if kinds.contains(&AgentKind::Collection) {
            finalize_collection(consolidator, base_name, &mut outputs)
        } else {
            None
        };

        ScheduledOutputs { outputs, exported }
    }

    async fn run_sequential(
        &self,
        ctx: &GenerationContext,
        sections: &[Section],
        kinds: &[AgentKind],
        consolidator: &mut CollectionConsolidator,
    ) -> Vec<ArtifactOutput> {
        let mut outputs = Vec::with_capacity(sections.len() * kinds.len());
        for section in sections {
            for &kind in kinds {
                let mut output = self.run_task(ctx, section, kind).await;
                if kind.is_stateful() {
                    route_contribution(consolidator, section, &mut output);
                }
                outputs.push(output);
            }
        }
        outputs
    }

    async fn run_parallel(
        &self,
        ctx: &GenerationContext,
        sections: &[Section],
        kinds: &[AgentKind],
        consolidator: &mut CollectionConsolidator,
    ) -> Vec<ArtifactOutput> {
        let stateless: Vec<(usize, AgentKind)> = sections
            .iter()
            .enumerate()
            .flat_map(|(idx, _)| {
                kinds
                    .iter()
                    .copied()
                    .filter(|k| !k.is_stateful())
                    .map(move |k| (idx, k))
            })
            .collect();

        let mut slots: Vec<Option<ArtifactOutput>> = vec![None; stateless.len()];
        for (batch_index, batch) in stateless.chunks(self.options.max_concurrent).enumerate() {
            debug!(batch_index, size = batch.len(), "Starting batch");
            let offset = batch_index * self.options.max_concurrent;
            let mut futures = FuturesUnordered::new();
            for (i, &(section_idx, kind)) in batch.iter().enumerate() {
                let section = &sections[section_idx];
                futures.push(async move { (offset + i, self.run_task(ctx, section, kind).await) });
            }
            while let Some((slot, output)) = futures.next().await {
                slots[slot] = Some(output);
            }
        }

        let mut stateless_outputs = slots.into_iter().flatten();
        let mut outputs = Vec::with_capacity(sections.len() * kinds.len());
        let stateless_per_section = kinds.iter().filter(|k| !k.is_stateful()).count();
        for _ in sections {
            outputs.extend(stateless_outputs.by_ref().take(stateless_per_section));
        }

        for &kind in kinds.iter().filter(|k| k.is_stateful()) {
            for section in sections {
                let mut output = self.run_task(ctx, section, kind).await;
                route_contribution(consolidator, section, &mut output);
                outputs.push(output);
            }
        }
        outputs
    }

    /// Run one generator, converting `Err`, panic and timeout into a failed output.
    async fn run_task(
        &self,
        ctx: &GenerationContext,
        section: &Section,
        kind: AgentKind,
    ) -> ArtifactOutput {
        let agent = self.registry.get(kind);
        let started = Instant::now();
        debug!(section_id = %section.id, %kind, "Task started");

        let guarded = AssertUnwindSafe(agent.generate(ctx, section)).catch_unwind();
        let outcome = match self.options.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ApiError::Generation(format!(
                    "{} generator timed out after {}s",
                    kind,
                    limit.as_secs()
                )))),
            },
            None => guarded.await,
        };

        let mut output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(section_id = %section.id, %kind, error = %err, "Task failed");
                ArtifactOutput::failed(kind, section.id.clone(), err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(section_id = %section.id, %kind, %message, "Task panicked");
                ArtifactOutput::failed(
                    kind,
                    section.id.clone(),
                    ApiError::Generation(format!("{} generator panicked: {}", kind, message))
                        .to_string(),
                )
            }
        };
        output.agent_kind = kind;
        output.section_id = section.id.clone();
        output.metrics.duration_secs = started.elapsed().as_secs_f64();

        debug!(
            section_id = %section.id,
            %kind,
            success = output.success,
            duration_secs = output.metrics.duration_secs,
            "Task finished"
        );
        output
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Hand a successful collection output's contribution to the consolidator.
fn route_contribution(
    consolidator: &mut CollectionConsolidator,
    section: &Section,
    output: &mut ArtifactOutput,
) {
    if !output.success {
        return;
    }
    let contribution = match &mut output.payload {
        ArtifactPayload::Collection(payload) => payload.contribution.take(),
        _ => None,
    };
    if let Some(contribution) = contribution {
        if let Err(err) = consolidator.contribute(section, contribution) {
            warn!(section_id = %section.id, error = %err, "Contribution rejected");
            output.fail_with(err.to_string());
        }
    }
}

/// Finalize once and attach the exported paths (or the error) to every collection output.
fn finalize_collection(
    consolidator: &mut CollectionConsolidator,
    base_name: &str,
    outputs: &mut [ArtifactOutput],
) -> Option<ExportedCollection> {
    let has_collection_output = outputs
        .iter()
        .any(|o| matches!(o.payload, ArtifactPayload::Collection(_)));
    if !has_collection_output {
        return None;
    }

    match consolidator.finalize(base_name) {
        Ok(exported) => {
            let validation = validate_collection(&exported.collection_file);
            if let Err(err) = &validation {
                warn!(error = %err, "Exported collection failed validation");
            }
            let mut first = true;
            for output in outputs.iter_mut() {
                if let ArtifactPayload::Collection(payload) = &mut output.payload {
                    payload.collection_file = Some(exported.collection_file.clone());
                    payload.environment_file = Some(exported.environment_file.clone());
                    payload.documentation_file = exported.documentation_file.clone();
                    output.artifact_paths.extend(exported.paths());

                    let metadata = &mut output.metadata;
                    metadata.insert("finalized".to_string(), json!(true));
                    metadata.insert("validation_passed".to_string(), json!(validation.is_ok()));
                    metadata.insert("generated_files".to_string(), json!(exported.file_kinds()));
                    if first {
                        metadata.insert("collection_summary".to_string(), json!(exported.summary()));
                        metadata.insert("folder_structure".to_string(), json!(exported.folder_names));
                        first = false;
                    }
                    if let Err(err) = &validation {
                        output.warnings.push(err.to_string());
                    }
                }
            }
            Some(exported)
        }
        Err(err) => {
            error!(error = %err, "Collection finalization failed");
            for output in outputs.iter_mut() {
                if matches!(output.payload, ArtifactPayload::Collection(_)) {
                    output.fail_with(err.to_string());
                }
            }
            None
        }
    }
}
