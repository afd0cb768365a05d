//! Loader facade: assembles the source chain and deserializes `SmithConfig`.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::SmithConfig;
use crate::error::ApiError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix for overrides, e.g. `TESTSMITH__GENERATION__MAX_CONCURRENT_AGENTS`.
const ENV_PREFIX: &str = "TESTSMITH";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Order (later wins): defaults, user-level file, `config/config.toml`,
    /// `config/$TESTSMITH_ENV.toml`, `TESTSMITH__SECTION__KEY` variables.
    /// `OPENAI_API_KEY` fills the provider key when nothing else set it.
    pub fn load(workspace_root: &Path) -> Result<SmithConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(env_source());

        let mut config: SmithConfig = builder.build()?.try_deserialize()?;
        apply_api_key_fallback(&mut config);
        debug!(
            workspace = %workspace_root.display(),
            model = %config.provider.model,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from a single explicit file over the defaults.
    /// `TESTSMITH__SECTION__KEY` variables still override the file.
    pub fn load_from_file(path: &Path) -> Result<SmithConfig, ApiError> {
        if !path.is_file() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(env_source());
        let mut config: SmithConfig = builder.build()?.try_deserialize()?;
        apply_api_key_fallback(&mut config);
        Ok(config)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn apply_api_key_fallback(config: &mut SmithConfig) {
    if config.provider.api_key.is_none() {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.provider.api_key = Some(key);
            }
        }
    }
}
