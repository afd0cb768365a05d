//! CLI output: error mapping and command results for the binary.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ProviderNotConfigured(_) => format!(
            "{}\nSet provider.api_key in config/config.toml or export OPENAI_API_KEY.",
            e
        ),
        _ => e.to_string(),
    }
}

/// Rendered command result; `success = false` maps to exit status 1.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }
}
