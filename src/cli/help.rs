//! CLI command-name contract for logging and routing.

use crate::cli::parse::{CacheCommands, Commands};

/// Command name string for log spans (e.g. "generate", "cache.stats").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Generate { .. } => "generate".to_string(),
        Commands::Status { .. } => "status".to_string(),
        Commands::Cache { command } => format!("cache.{}", cache_command_name(command)),
    }
}

pub fn cache_command_name(command: &CacheCommands) -> &'static str {
    match command {
        CacheCommands::Stats { .. } => "stats",
        CacheCommands::Cleanup { .. } => "cleanup",
    }
}
