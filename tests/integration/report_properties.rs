//! Property-based tests for run report compilation

use proptest::prelude::*;
use std::time::Duration;
use testsmith::agent::{AgentKind, ArtifactOutput, ArtifactPayload, TabularPayload};
use testsmith::report::{OutputsByKind, ResultCompiler, RunContext};
use testsmith::types::TokenUsage;

fn output(index: usize, input: u32, output: u32, success: bool) -> ArtifactOutput {
    let section = format!("s{}", index);
    let out = if success {
        ArtifactOutput::succeeded(
            AgentKind::Tabular,
            section,
            ArtifactPayload::Tabular(TabularPayload {
                row_count: 1,
                ..Default::default()
            }),
        )
    } else {
        ArtifactOutput::failed(AgentKind::Tabular, section, format!("failure {}", index % 3))
    };
    out.with_usage(TokenUsage::new(u64::from(input), u64::from(output)))
}

/// Report token usage equals the sum over every output, failed ones included.
#[test]
fn test_report_usage_is_additive() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::vec((0u32..10_000, 0u32..10_000, any::<bool>()), 0..40),
            |usages| {
                let outputs: Vec<ArtifactOutput> = usages
                    .iter()
                    .enumerate()
                    .map(|(i, (input, out, ok))| output(i, *input, *out, *ok))
                    .collect();
                let expected_in: u64 = usages.iter().map(|(i, _, _)| u64::from(*i)).sum();
                let expected_out: u64 = usages.iter().map(|(_, o, _)| u64::from(*o)).sum();
                let any_failed = usages.iter().any(|(_, _, ok)| !ok);

                let report = ResultCompiler::new().compile(
                    "prop",
                    &RunContext::default(),
                    OutputsByKind::from_outputs(outputs),
                    Duration::ZERO,
                );

                prop_assert_eq!(report.token_usage.input_tokens, expected_in);
                prop_assert_eq!(report.token_usage.output_tokens, expected_out);
                prop_assert_eq!(report.token_usage.total_tokens, expected_in + expected_out);
                prop_assert_eq!(report.tabular.len(), usages.len());
                prop_assert_eq!(report.success, !usages.is_empty() && !any_failed);
                // Failure messages repeat modulo 3 and are deduplicated.
                prop_assert!(report.errors.len() <= 3);
                Ok(())
            },
        )
        .unwrap();
}
