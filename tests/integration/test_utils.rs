//! Shared test doubles and fixtures for integration tests
//!
//! The library's own mock provider is test-only, so these doubles implement the public
//! provider traits directly.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use testsmith::error::ApiError;
use testsmith::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, FileUploader, ModelProviderClient,
};
use testsmith::types::TokenUsage;

/// Global mutex serializing tests that touch process environment variables
pub static ENV_MUTEX: Mutex<()> = parking_lot::const_mutex(());

/// Provider that answers by looking at the system prompt of each request.
pub struct RoutingProvider {
    calls: Mutex<Vec<String>>,
    fail_on: Option<(&'static str, &'static str)>,
}

impl RoutingProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    /// Fails the request for one kind and section name with a request error.
    pub fn failing_on(kind: &'static str, section: &'static str) -> Self {
        Self {
            fail_on: Some((kind, section)),
            ..Self::new()
        }
    }

    /// Kinds requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn section_name(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find_map(|m| {
            m.content
                .lines()
                .find_map(|line| line.strip_prefix("## Section: "))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

#[async_trait]
impl ModelProviderClient for RoutingProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let system = messages.first().map(|m| m.content.clone()).unwrap_or_default();
        let (kind, body) = if system.contains("QMetry") {
            (
                "tabular",
                json!({
                    "test_cases": [
                        {"test_case_id": "TC_1", "test_case_name": "List", "test_steps": ["GET"], "expected_results": "200"},
                        {"test_case_id": "TC_2", "test_case_name": "Missing", "test_steps": ["GET"], "expected_results": "404"}
                    ],
                    "metadata": {}
                }),
            )
        } else if system.contains("Postman") {
            let name = section_name(&messages);
            (
                "collection",
                json!({
                    "collection": {
                        "name": format!("{} API Collection", name),
                        "item": [
                            {"name": "list", "request": {"method": "GET", "url": "{{base_url}}/x"}},
                            {"name": "nested", "item": [
                                {"name": "create", "request": {"method": "POST", "url": "{{base_url}}/x"}}
                            ]}
                        ],
                        "variable": [{"key": "base_url", "value": format!("https://{}.example", name.to_lowercase())}]
                    },
                    "environments": [{"name": "Test", "values": [{"key": "auth_token", "value": ""}]}]
                }),
            )
        } else if system.contains("Karate") {
            (
                "scenario",
                json!({
                    "feature_file": {
                        "feature_title": "Feature",
                        "scenarios": [{"name": "happy path", "steps": ["Given url baseUrl", "When method get", "Then status 200"]}]
                    }
                }),
            )
        } else {
            ("other", json!({}))
        };
        self.calls.lock().push(kind.to_string());

        let failing = matches!(self.fail_on, Some((k, s)) if k == kind && s == section_name(&messages));
        if failing {
            return Err(ApiError::ProviderRequestFailed("scripted outage".to_string()));
        }

        Ok(CompletionResponse {
            content: body.to_string(),
            model: "routing".to_string(),
            usage: TokenUsage::new(100, 40),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "routing"
    }

    fn model_name(&self) -> &str {
        "routing"
    }
}

/// Uploader that hands out sequential ids and records every upload.
pub struct CountingUploader {
    uploads: Mutex<Vec<PathBuf>>,
}

impl CountingUploader {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl FileUploader for CountingUploader {
    async fn upload(&self, path: &Path, _purpose: &str) -> Result<String, ApiError> {
        let mut uploads = self.uploads.lock();
        uploads.push(path.to_path_buf());
        Ok(format!("file-{}", uploads.len()))
    }
}

/// Write a small OpenAPI document and return its path.
pub fn write_spec(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        "openapi: 3.0.0\ninfo:\n  title: Users\n  version: 1.0.0\npaths:\n  /users:\n    get: {}\n",
    )
    .unwrap();
    path
}
