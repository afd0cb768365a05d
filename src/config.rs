//! Configuration System
//!
//! Layered configuration for a generation run: built-in defaults, the user-level file,
//! workspace files, then `TESTSMITH__*` environment overrides. Components receive the
//! sections they need from the run composition root; nothing reads configuration globally.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmithConfig {
    /// Generative completion service
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Scheduling and agent settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Input file limits
    #[serde(default)]
    pub files: FileLimits,

    /// Content cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Artifact output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler and agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Batch size for concurrently running stateless tasks
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,

    /// Per-task timeout in seconds; 0 disables the timeout
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// Upper bound handed to the planner for one section
    #[serde(default = "default_max_tokens_per_section")]
    pub max_tokens_per_section: u32,

    /// Write companion documentation next to generated artifacts
    #[serde(default = "default_true")]
    pub generate_documentation: bool,
}

fn default_max_concurrent_agents() -> usize {
    3
}

fn default_agent_timeout_secs() -> u64 {
    120
}

fn default_max_tokens_per_section() -> u32 {
    8000
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            agent_timeout_secs: default_agent_timeout_secs(),
            max_tokens_per_section: default_max_tokens_per_section(),
            generate_documentation: default_true(),
        }
    }
}

/// Per-file size/type limits enforced by the content cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLimits {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Lowercase extensions including the leading dot
    #[serde(default = "default_supported_file_types")]
    pub supported_file_types: Vec<String>,
}

fn default_max_file_size_mb() -> u64 {
    32
}

fn default_supported_file_types() -> Vec<String> {
    [".yaml", ".yml", ".json", ".pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            supported_file_types: default_supported_file_types(),
        }
    }
}

impl FileLimits {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Registry file; defaults to the platform cache directory
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl CacheConfig {
    /// Resolve the registry path, falling back to `<cache_dir>/file_registry.json`
    /// and finally to `./cache/file_registry.json` when no home directory is known.
    pub fn resolved_registry_path(&self) -> PathBuf {
        if let Some(path) = &self.registry_path {
            return path.clone();
        }
        directories::ProjectDirs::from("dev", "testsmith", "testsmith")
            .map(|dirs| dirs.cache_dir().join("file_registry.json"))
            .unwrap_or_else(|| PathBuf::from("cache").join("file_registry.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("outputs")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Generation(String),
    Files(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Files(msg) => write!(f, "Files: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_agents == 0 {
            return Err("max_concurrent_agents must be at least 1".to_string());
        }
        if self.max_tokens_per_section == 0 {
            return Err("max_tokens_per_section must be at least 1".to_string());
        }
        Ok(())
    }
}

impl FileLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size_mb == 0 || self.max_file_size_mb > 100 {
            return Err("max_file_size_mb must be between 1 and 100".to_string());
        }
        if self.supported_file_types.is_empty() {
            return Err("supported_file_types cannot be empty".to_string());
        }
        if let Some(bad) = self
            .supported_file_types
            .iter()
            .find(|ext| !ext.starts_with('.'))
        {
            return Err(format!("File type '{}' must start with '.'", bad));
        }
        Ok(())
    }
}

impl SmithConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }
        if let Err(e) = self.files.validate() {
            errors.push(ValidationError::Files(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all problems into one `ApiError::ConfigError`
    pub fn validate_or_error(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}
