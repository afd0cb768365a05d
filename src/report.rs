//! Result compilation: merges every artifact output of a run into one `RunReport`.
//!
//! Compilation never fails. Outputs whose payload belongs to another kind are dropped with
//! a warning. Null outputs are not bucketed but still contribute their errors and warnings.

use crate::agent::{AgentKind, ArtifactOutput, ArtifactPayload};
use crate::error::ApiError;
use crate::section::SectioningStrategy;
use crate::types::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// What the run was asked to do; copied verbatim into the report.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub input_files: Vec<PathBuf>,
    pub focus: Option<String>,
    pub strategy: SectioningStrategy,
    pub sections_planned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl From<TokenUsage> for ReportUsage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
        }
    }
}

/// Outputs bucketed by the kind the scheduler ran them as
#[derive(Debug, Clone, Default)]
pub struct OutputsByKind {
    buckets: BTreeMap<AgentKind, Vec<ArtifactOutput>>,
}

impl OutputsByKind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_outputs(outputs: impl IntoIterator<Item = ArtifactOutput>) -> Self {
        let mut grouped = Self::new();
        for output in outputs {
            grouped.push(output);
        }
        grouped
    }

    pub fn push(&mut self, output: ArtifactOutput) {
        self.buckets.entry(output.agent_kind).or_default().push(output);
    }

    /// Put an output into an explicit bucket regardless of its own kind.
    pub fn push_into(&mut self, kind: AgentKind, output: ArtifactOutput) {
        self.buckets.entry(kind).or_default().push(output);
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consolidated result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    pub status: RunStatus,
    pub input_files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub strategy: SectioningStrategy,
    pub sections_planned: usize,
    pub sections_processed: usize,
    pub tabular: Vec<ArtifactOutput>,
    pub scenario: Vec<ArtifactOutput>,
    pub collection: Vec<ArtifactOutput>,
    pub token_usage: ReportUsage,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: String,
    pub elapsed_secs: f64,
    pub created_at: DateTime<Utc>,
}

impl RunReport {
    pub fn outputs(&self, kind: AgentKind) -> &[ArtifactOutput] {
        match kind {
            AgentKind::Tabular => &self.tabular,
            AgentKind::Scenario => &self.scenario,
            AgentKind::Collection => &self.collection,
        }
    }

    pub fn all_outputs(&self) -> impl Iterator<Item = &ArtifactOutput> {
        self.tabular
            .iter()
            .chain(self.scenario.iter())
            .chain(self.collection.iter())
    }

    /// Distinct files written by successful outputs.
    pub fn artifacts_generated(&self) -> usize {
        self.all_outputs()
            .filter(|o| o.success)
            .flat_map(|o| o.artifact_paths.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Tabular rows plus scenarios across successful outputs.
    pub fn test_cases_generated(&self) -> usize {
        self.tabular
            .iter()
            .chain(self.scenario.iter())
            .filter(|o| o.success)
            .map(|o| o.payload.item_count())
            .sum()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultCompiler;

impl ResultCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(
        &self,
        run_id: &str,
        context: &RunContext,
        outputs: OutputsByKind,
        elapsed: Duration,
    ) -> RunReport {
        let mut tabular = Vec::new();
        let mut scenario = Vec::new();
        let mut collection = Vec::new();
        // Messages carried by outputs that are not bucketed.
        let mut unbucketed_errors = Vec::new();
        let mut unbucketed_warnings = Vec::new();

        for (bucket, bucket_outputs) in outputs.buckets {
            for output in bucket_outputs {
                match output.payload.kind() {
                    Some(kind) if kind == bucket => {}
                    None => {
                        debug!(
                            kind = %bucket,
                            section_id = %output.section_id,
                            "Output produced nothing"
                        );
                        unbucketed_errors.extend(output.errors);
                        unbucketed_warnings.extend(output.warnings);
                        continue;
                    }
                    Some(_) => {
                        let err = ApiError::Compilation(format!(
                            "{} output for section {} carries a {} payload",
                            bucket,
                            output.section_id,
                            payload_label(&output.payload)
                        ));
                        warn!(error = %err, "Dropping output");
                        unbucketed_warnings.push(err.to_string());
                        continue;
                    }
                }
                match bucket {
                    AgentKind::Tabular => tabular.push(output),
                    AgentKind::Scenario => scenario.push(output),
                    AgentKind::Collection => collection.push(output),
                }
            }
        }

        let kept = || tabular.iter().chain(scenario.iter()).chain(collection.iter());
        let usage: TokenUsage = kept().map(|o| o.metrics.token_usage).sum();
        let mut errors = dedup_in_order(
            kept()
                .flat_map(|o| o.errors.iter().cloned())
                .chain(unbucketed_errors),
        );
        let warnings = dedup_in_order(
            kept()
                .flat_map(|o| o.warnings.iter().cloned())
                .chain(unbucketed_warnings),
        );
        let sections_processed = kept()
            .map(|o| o.section_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let any_output = !(tabular.is_empty() && scenario.is_empty() && collection.is_empty());
        if !any_output && errors.is_empty() {
            errors.push(ApiError::Compilation(NO_OUTPUT_ERROR.to_string()).to_string());
        }

        let success = errors.is_empty();
        let summary = if success {
            success_summary(
                context.sections_planned,
                context.strategy,
                count_items(&tabular),
                count_items(&scenario),
                count_items(&collection),
                elapsed,
            )
        } else {
            FAILED_SUMMARY.to_string()
        };

        info!(
            run_id,
            success,
            sections_processed,
            total_tokens = usage.total(),
            errors = errors.len(),
            "Compiled run report"
        );

        RunReport {
            run_id: run_id.to_string(),
            success,
            status: if success {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
            input_files: context.input_files.clone(),
            focus: context.focus.clone(),
            strategy: context.strategy,
            sections_planned: context.sections_planned,
            sections_processed,
            tabular,
            scenario,
            collection,
            token_usage: usage.into(),
            errors,
            warnings,
            summary,
            elapsed_secs: elapsed.as_secs_f64(),
            created_at: Utc::now(),
        }
    }

    /// Report for a run that failed before any task was scheduled.
    pub fn create_error_result(
        &self,
        run_id: &str,
        context: &RunContext,
        error: &ApiError,
        elapsed: Duration,
    ) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            success: false,
            status: RunStatus::Failed,
            input_files: context.input_files.clone(),
            focus: context.focus.clone(),
            strategy: context.strategy,
            sections_planned: context.sections_planned,
            sections_processed: 0,
            tabular: Vec::new(),
            scenario: Vec::new(),
            collection: Vec::new(),
            token_usage: ReportUsage::default(),
            errors: vec![error.to_string()],
            warnings: Vec::new(),
            summary: FAILED_SUMMARY.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            created_at: Utc::now(),
        }
    }
}

const FAILED_SUMMARY: &str = "Execution failed - see errors for details";
const NO_OUTPUT_ERROR: &str = "no generator produced output for the enabled kinds";

fn payload_label(payload: &ArtifactPayload) -> &'static str {
    payload.kind().map(|k| k.as_str()).unwrap_or("null")
}

fn count_items(outputs: &[ArtifactOutput]) -> usize {
    outputs
        .iter()
        .filter(|o| o.success)
        .map(|o| o.payload.item_count())
        .sum()
}

fn dedup_in_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

fn success_summary(
    sections: usize,
    strategy: SectioningStrategy,
    tabular: usize,
    scenarios: usize,
    requests: usize,
    elapsed: Duration,
) -> String {
    let mut parts = vec![format!(
        "Successfully processed {} sections using {} strategy.",
        sections, strategy
    )];
    if tabular > 0 {
        parts.push(format!("Generated {} tabular test cases.", tabular));
    }
    if scenarios > 0 {
        parts.push(format!("Generated {} scenarios.", scenarios));
    }
    if requests > 0 {
        parts.push(format!("Generated {} collection requests.", requests));
    }
    parts.push(format!("Completed in {:.2} seconds.", elapsed.as_secs_f64()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{CollectionPayload, ScenarioPayload, TabularPayload};

    fn tabular(section: &str, rows: usize) -> ArtifactOutput {
        ArtifactOutput::succeeded(
            AgentKind::Tabular,
            section,
            ArtifactPayload::Tabular(TabularPayload {
                row_count: rows,
                ..Default::default()
            }),
        )
        .with_usage(TokenUsage::new(100, 50))
    }

    fn context() -> RunContext {
        RunContext {
            input_files: vec![PathBuf::from("api.yaml")],
            focus: None,
            strategy: SectioningStrategy::ByTag,
            sections_planned: 2,
        }
    }

    #[test]
    fn test_successful_summary_lists_non_zero_kinds() {
        let mut outputs = OutputsByKind::new();
        outputs.push(tabular("s1", 4));
        outputs.push(tabular("s2", 3));
        outputs.push(ArtifactOutput::succeeded(
            AgentKind::Collection,
            "s1",
            ArtifactPayload::Collection(CollectionPayload {
                request_count: 6,
                ..Default::default()
            }),
        ));

        let report = ResultCompiler::new().compile("r1", &context(), outputs, Duration::from_millis(1500));

        assert!(report.success);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.sections_processed, 2);
        assert_eq!(
            report.summary,
            "Successfully processed 2 sections using by_tag strategy. \
             Generated 7 tabular test cases. Generated 6 collection requests. \
             Completed in 1.50 seconds."
        );
        assert_eq!(report.test_cases_generated(), 7);
    }

    #[test]
    fn test_failed_outputs_still_count_tokens() {
        let mut outputs = OutputsByKind::new();
        outputs.push(tabular("s1", 4));
        outputs.push(
            ArtifactOutput::failed(AgentKind::Scenario, "s1", "Generation failed: boom")
                .with_usage(TokenUsage::new(7, 3)),
        );

        let report = ResultCompiler::new().compile("r1", &context(), outputs, Duration::ZERO);

        assert!(!report.success);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.summary, "Execution failed - see errors for details");
        assert_eq!(report.token_usage.input_tokens, 107);
        assert_eq!(report.token_usage.output_tokens, 53);
        assert_eq!(report.token_usage.total_tokens, 160);
        assert!(report.has_errors());
    }

    #[test]
    fn test_mismatched_payload_is_dropped() {
        let mut outputs = OutputsByKind::new();
        outputs.push(tabular("s1", 2));
        outputs.push_into(
            AgentKind::Scenario,
            ArtifactOutput::succeeded(
                AgentKind::Scenario,
                "s1",
                ArtifactPayload::Tabular(TabularPayload::default()),
            )
            .with_usage(TokenUsage::new(1000, 1000)),
        );
        outputs.push(ArtifactOutput::succeeded(AgentKind::Collection, "s1", ArtifactPayload::Null));

        let report = ResultCompiler::new().compile("r1", &context(), outputs, Duration::ZERO);

        assert!(report.success);
        assert!(report.scenario.is_empty());
        assert!(report.collection.is_empty());
        assert_eq!(report.token_usage.total_tokens, 150);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Compilation failed: scenario output"));
    }

    #[test]
    fn test_null_outputs_keep_warnings_and_fail_with_explicit_error() {
        let mut nothing = ArtifactOutput::succeeded(AgentKind::Scenario, "s1", ArtifactPayload::Null);
        nothing
            .warnings
            .push("No scenario generator is available; nothing was produced".to_string());

        let report = ResultCompiler::new().compile(
            "r1",
            &context(),
            OutputsByKind::from_outputs(vec![nothing]),
            Duration::ZERO,
        );

        assert!(!report.success);
        assert!(report.scenario.is_empty());
        assert_eq!(
            report.warnings,
            vec!["No scenario generator is available; nothing was produced"]
        );
        assert_eq!(
            report.errors,
            vec!["Compilation failed: no generator produced output for the enabled kinds"]
        );
        assert_eq!(report.summary, "Execution failed - see errors for details");
    }

    #[test]
    fn test_null_warning_survives_next_to_real_output() {
        let mut nothing = ArtifactOutput::succeeded(AgentKind::Scenario, "s1", ArtifactPayload::Null);
        nothing.warnings.push("No scenario generator is available; nothing was produced".to_string());

        let report = ResultCompiler::new().compile(
            "r1",
            &context(),
            OutputsByKind::from_outputs(vec![tabular("s1", 2), nothing]),
            Duration::ZERO,
        );

        assert!(report.success);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_summary_uses_planned_section_count() {
        let report = ResultCompiler::new().compile(
            "r1",
            &RunContext {
                sections_planned: 3,
                ..context()
            },
            OutputsByKind::from_outputs(vec![tabular("s1", 1)]),
            Duration::ZERO,
        );
        assert_eq!(report.sections_processed, 1);
        assert!(report.summary.starts_with("Successfully processed 3 sections"));
    }

    #[test]
    fn test_errors_and_warnings_dedup_preserving_order() {
        let mut a = ArtifactOutput::failed(AgentKind::Tabular, "s1", "e1");
        a.warnings = vec!["w2".to_string(), "w1".to_string()];
        let mut b = ArtifactOutput::failed(AgentKind::Tabular, "s2", "e2");
        b.errors.push("e1".to_string());
        b.warnings = vec!["w1".to_string(), "w3".to_string()];

        let report = ResultCompiler::new().compile(
            "r1",
            &context(),
            OutputsByKind::from_outputs(vec![a, b]),
            Duration::ZERO,
        );

        assert_eq!(report.errors, vec!["e1", "e2"]);
        assert_eq!(report.warnings, vec!["w2", "w1", "w3"]);
    }

    #[test]
    fn test_no_outputs_is_not_success() {
        let report =
            ResultCompiler::new().compile("r1", &context(), OutputsByKind::new(), Duration::ZERO);
        assert!(!report.success);
        assert_eq!(report.sections_processed, 0);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_error_result() {
        let err = ApiError::Validation("File not found: api.yaml".to_string());
        let report = ResultCompiler::new().create_error_result("r1", &context(), &err, Duration::from_secs(1));
        assert!(!report.success);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.errors, vec!["Validation failed: File not found: api.yaml"]);
        assert_eq!(report.token_usage, ReportUsage::default());
        assert_eq!(report.artifacts_generated(), 0);
    }

    #[test]
    fn test_artifacts_generated_counts_distinct_paths() {
        let shared = vec![PathBuf::from("c.json"), PathBuf::from("c_environment.json")];
        let mut c1 = ArtifactOutput::succeeded(
            AgentKind::Collection,
            "s1",
            ArtifactPayload::Collection(CollectionPayload::default()),
        );
        c1.artifact_paths = shared.clone();
        let mut c2 = c1.clone();
        c2.section_id = "s2".to_string();
        let mut s = ArtifactOutput::succeeded(
            AgentKind::Scenario,
            "s1",
            ArtifactPayload::Scenario(ScenarioPayload {
                scenario_count: 2,
                ..Default::default()
            }),
        );
        s.artifact_paths = vec![PathBuf::from("s1.feature")];

        let report = ResultCompiler::new().compile(
            "r1",
            &context(),
            OutputsByKind::from_outputs(vec![c1, c2, s]),
            Duration::ZERO,
        );
        assert_eq!(report.artifacts_generated(), 3);
        assert_eq!(report.test_cases_generated(), 2);
    }
}
