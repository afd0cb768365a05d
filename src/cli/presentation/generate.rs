//! Run report presentation for `testsmith generate`.

use super::shared::{format_section_heading, to_json_pretty};
use crate::error::ApiError;
use crate::report::{RunReport, RunStatus};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_report_json(report: &RunReport) -> Result<String, ApiError> {
    to_json_pretty(report)
}

pub fn format_report_text(report: &RunReport) -> String {
    let mut out = String::new();
    let status = match report.status {
        RunStatus::Completed => report.status.as_str().green().to_string(),
        RunStatus::Failed => report.status.as_str().red().to_string(),
    };
    out.push_str(&format!("{}\n\n", format_section_heading("Run Report")));
    out.push_str(&format!("  Run:       {}\n", report.run_id));
    out.push_str(&format!("  Status:    {}\n", status));
    out.push_str(&format!("  Strategy:  {}\n", report.strategy));
    out.push_str(&format!(
        "  Sections:  {} processed / {} planned\n",
        report.sections_processed, report.sections_planned
    ));
    out.push_str(&format!(
        "  Artifacts: {} files, {} test cases\n",
        report.artifacts_generated(),
        report.test_cases_generated()
    ));
    out.push_str(&format!(
        "  Tokens:    {} in / {} out / {} total\n\n",
        report.token_usage.input_tokens,
        report.token_usage.output_tokens,
        report.token_usage.total_tokens
    ));

    if report.all_outputs().next().is_some() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Section", "Kind", "Result", "Items", "Seconds"]);
        for output in report.all_outputs() {
            table.add_row(vec![
                output.section_id.clone(),
                output.agent_kind.to_string(),
                if output.success { "ok" } else { "failed" }.to_string(),
                output.payload.item_count().to_string(),
                format!("{:.2}", output.metrics.duration_secs),
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    if !report.errors.is_empty() {
        out.push_str(&format!("Errors ({}):\n", report.errors.len()));
        for e in &report.errors {
            out.push_str(&format!("  - {}\n", e));
        }
        out.push('\n');
    }
    if !report.warnings.is_empty() {
        out.push_str(&format!("Warnings ({}):\n", report.warnings.len()));
        for w in &report.warnings {
            out.push_str(&format!("  - {}\n", w));
        }
        out.push('\n');
    }
    out.push_str(&report.summary);
    out
}
