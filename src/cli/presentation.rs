//! CLI presentation: text and json formatters per command family.

mod cache;
mod generate;
mod shared;
mod status;

pub use cache::{format_cache_stats, format_cleanup_report};
pub use generate::{format_report_json, format_report_text};
pub use shared::format_section_heading;
pub use status::{format_status, StatusView};
