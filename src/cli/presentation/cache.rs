//! Cache command presentation: stats and cleanup text/json.

use super::shared::to_json_pretty;
use crate::cache::{CacheStats, CleanupReport};
use crate::error::ApiError;
use std::path::Path;

pub fn format_cache_stats(
    stats: &CacheStats,
    registry_path: &Path,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        return to_json_pretty(&serde_json::json!({
            "registry_path": registry_path,
            "total_files": stats.total_files,
            "total_bytes": stats.total_bytes,
            "distinct_mime_kinds": stats.distinct_mime_kinds,
        }));
    }
    Ok(format!(
        "Cache registry: {}\n  Files: {}\n  Size: {:.2} MB\n  MIME kinds: {}",
        registry_path.display(),
        stats.total_files,
        stats.total_bytes as f64 / (1024.0 * 1024.0),
        stats.distinct_mime_kinds
    ))
}

pub fn format_cleanup_report(report: &CleanupReport, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json_pretty(report);
    }
    if report.removed == 0 {
        return Ok(format!(
            "Cache is clean ({} entries).",
            report.current
        ));
    }
    Ok(format!(
        "Removed {} stale entries ({} -> {}).",
        report.removed, report.initial, report.current
    ))
}
