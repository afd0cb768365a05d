//! Integration tests for configuration layering

use super::test_utils::ENV_MUTEX;
use testsmith::config::{ConfigLoader, ProviderType};
use testsmith::error::ApiError;
use tempfile::TempDir;

/// Run `f` with the given variables set, restoring the previous values afterwards.
fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let _guard = ENV_MUTEX.lock();
    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
        .collect();
    for (k, v) in vars {
        std::env::set_var(k, v);
    }
    let result = f();
    for (k, v) in previous {
        match v {
            Some(v) => std::env::set_var(&k, v),
            None => std::env::remove_var(&k),
        }
    }
    result
}

#[test]
fn test_workspace_layers_and_env_override() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
[provider]
provider_type = "local"
model = "llama3"
base_url = "http://localhost:11434/v1"

[generation]
max_concurrent_agents = 2
agent_timeout_secs = 30
"#,
    )
    .unwrap();
    std::fs::write(
        config_dir.join("ci.toml"),
        "[output]\ndirectory = \"build/artifacts\"\n",
    )
    .unwrap();

    let xdg = temp_dir.path().join("xdg");
    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg.to_str().unwrap()),
            ("TESTSMITH_ENV", "ci"),
            ("TESTSMITH__GENERATION__MAX_CONCURRENT_AGENTS", "5"),
        ],
        || ConfigLoader::load(temp_dir.path()).unwrap(),
    );

    assert_eq!(config.provider.provider_type, ProviderType::Local);
    assert_eq!(config.provider.model, "llama3");
    assert_eq!(config.generation.max_concurrent_agents, 5);
    assert_eq!(config.generation.agent_timeout_secs, 30);
    assert_eq!(config.output.directory, std::path::PathBuf::from("build/artifacts"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_user_level_file_is_read_from_xdg_config_home() {
    let temp_dir = TempDir::new().unwrap();
    let xdg = temp_dir.path().join("xdg");
    std::fs::create_dir_all(xdg.join("testsmith")).unwrap();
    std::fs::write(
        xdg.join("testsmith").join("config.toml"),
        "[files]\nmax_file_size_mb = 8\n",
    )
    .unwrap();
    let workspace = temp_dir.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let config = with_env(&[("XDG_CONFIG_HOME", xdg.to_str().unwrap())], || {
        ConfigLoader::load(&workspace).unwrap()
    });
    assert_eq!(config.files.max_file_size_mb, 8);
}

#[test]
fn test_validation_collects_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    std::fs::write(
        &config_file,
        r#"
[provider]
provider_type = "local"

[generation]
max_concurrent_agents = 0

[files]
max_file_size_mb = 500
"#,
    )
    .unwrap();

    let config = with_env(&[], || ConfigLoader::load_from_file(&config_file).unwrap());
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        config.validate_or_error(),
        Err(ApiError::ConfigError(msg)) if msg.contains("max_file_size_mb")
    ));
}

#[test]
fn test_explicit_file_still_takes_env_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("smith.toml");
    std::fs::write(
        &config_file,
        "[generation]\nmax_concurrent_agents = 2\nagent_timeout_secs = 45\n",
    )
    .unwrap();

    let config = with_env(
        &[("TESTSMITH__GENERATION__MAX_CONCURRENT_AGENTS", "7")],
        || ConfigLoader::load_from_file(&config_file).unwrap(),
    );
    assert_eq!(config.generation.max_concurrent_agents, 7);
    assert_eq!(config.generation.agent_timeout_secs, 45);
}
