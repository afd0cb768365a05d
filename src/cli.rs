//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{cache_command_name, command_name};
pub use output::{map_error, CommandOutput};
pub use parse::{CacheCommands, Cli, Commands};
pub use presentation::{
    format_cache_stats, format_cleanup_report, format_report_json, format_report_text,
    format_section_heading, format_status, StatusView,
};
pub use route::{enabled_kinds, CommandContext};
