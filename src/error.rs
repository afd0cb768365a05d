//! Error types for the test artifact generation pipeline.

use thiserror::Error;

/// Storage-related errors (cache registry, artifact files)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Registry data error: {0}")]
    RegistryData(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by run coordination and its collaborators
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad, oversized, or unsupported input file. Aborts the run before scheduling.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Cache acquisition could not upload or prepare an input.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Section planning failed before any task was scheduled.
    #[error("Planning failed: {0}")]
    Planning(String),

    /// A single generator task failed; recovered into a failed output.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Contribute-after-finalize, double finalize, or export failure.
    #[error("Consolidation failed: {0}")]
    Consolidation(String),

    /// An output of unexpected shape reached the result compiler.
    #[error("Compilation failed: {0}")]
    Compilation(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::StorageError(StorageError::IoError(err))
    }
}
