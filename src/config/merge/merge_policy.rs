//! Merge rules: defaults applied beneath every file and environment source.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the run defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("generation.max_concurrent_agents", 3_i64)?
        .set_default("generation.agent_timeout_secs", 120_i64)?
        .set_default("files.max_file_size_mb", 32_i64)?
        .set_default("output.directory", "outputs")
}
