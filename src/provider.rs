//! Model Provider Abstraction
//!
//! Thin client for an OpenAI-compatible chat-completion service plus the file upload
//! endpoint used by the content cache. Generator agents and the section planner only
//! see the `ModelProviderClient` and `FileUploader` traits.

use crate::error::ApiError;
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Kind of completion service the run talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// api.openai.com or any endpoint speaking its protocol with a bearer key
    #[default]
    OpenAI,
    /// Self-hosted OpenAI-compatible server; no key required
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Local => "local",
        }
    }
}

/// `[provider]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_type: ProviderType,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer key; falls back to `OPENAI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    16000
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model cannot be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be at least 1".to_string());
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("base_url must be an http(s) URL, got '{}'", url));
            }
        }
        if self.provider_type == ProviderType::Local && self.base_url.is_none() {
            return Err("local provider requires base_url".to_string());
        }
        Ok(())
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Chat message; `file_ids` reference files previously uploaded through `FileUploader`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            file_ids: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            file_ids: Vec::new(),
        }
    }

    pub fn with_files(mut self, file_ids: Vec<String>) -> Self {
        self.file_ids = file_ids;
        self
    }
}

/// Completion options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the service for a single JSON object
    pub json_output: bool,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// Uploads an input file and returns the service-side reference id
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, path: &Path, purpose: &str) -> Result<String, ApiError>;
}

/// Run a JSON-mode completion and parse its content.
pub async fn complete_json(
    client: &dyn ModelProviderClient,
    messages: Vec<ChatMessage>,
    max_tokens: Option<u32>,
) -> Result<(Value, TokenUsage), ApiError> {
    let options = CompletionOptions {
        temperature: None,
        max_tokens,
        json_output: true,
    };
    let response = client.complete(messages, options).await?;
    let value = parse_json_content(&response.content)?;
    Ok((value, response.usage))
}

/// Parse a completion body as JSON, tolerating a surrounding markdown code fence.
pub fn parse_json_content(content: &str) -> Result<Value, ApiError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| ApiError::ProviderError(format!("Response is not valid JSON: {}", e)))
}

// OpenAI-compatible request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

fn role_to_string(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn message_to_wire(message: ChatMessage) -> Value {
    let role = role_to_string(message.role);
    if message.file_ids.is_empty() {
        return json!({ "role": role, "content": message.content });
    }
    let mut parts: Vec<Value> = message
        .file_ids
        .into_iter()
        .map(|id| json!({ "type": "file", "file": { "file_id": id } }))
        .collect();
    parts.push(json!({ "type": "text", "text": message.content }));
    json!({ "role": role, "content": parts })
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        return map_status(status.as_u16(), &error.to_string());
    }
    if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, detail: &str) -> ApiError {
    match status {
        401 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", detail)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

async fn error_from_response(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    map_status(status, &error_text)
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// OpenAI-compatible provider client
pub struct OpenAIClient {
    client: Client,
    provider_name: &'static str,
    model: String,
    api_key: Option<String>,
    base_url: String,
    default_temperature: f32,
}

impl OpenAIClient {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = build_provider_http_client(request_timeout)?;
        let base_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider_name: "openai",
            model,
            api_key,
            base_url,
            default_temperature: default_temperature(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

#[async_trait]
impl ModelProviderClient for OpenAIClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.into_iter().map(message_to_wire).collect(),
            temperature: Some(options.temperature.unwrap_or(self.default_temperature)),
            max_tokens: options.max_tokens,
            response_format: options
                .json_output
                .then(|| json!({ "type": "json_object" })),
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let usage = completion
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ProviderError("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model,
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl FileUploader for OpenAIClient {
    async fn upload(&self, path: &Path, purpose: &str) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);

        let url = format!("{}/files", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Upload(map_http_error(e).to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Upload(error_from_response(response).await.to_string()));
        }

        let file: FileObject = response
            .json()
            .await
            .map_err(|e| ApiError::Upload(format!("Failed to parse upload response: {}", e)))?;
        Ok(file.id)
    }
}

/// Builds provider clients from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    fn build(config: &ProviderConfig) -> Result<Arc<OpenAIClient>, ApiError> {
        config.validate().map_err(ApiError::ConfigError)?;
        let api_key = match config.provider_type {
            ProviderType::OpenAI => Some(config.api_key.clone().ok_or_else(|| {
                ApiError::ProviderNotConfigured(
                    "OpenAI provider requires an API key (provider.api_key or OPENAI_API_KEY)"
                        .to_string(),
                )
            })?),
            ProviderType::Local => config.api_key.clone(),
        };
        let mut client = OpenAIClient::new(
            config.model.clone(),
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        client.provider_name = config.provider_type.as_str();
        client.default_temperature = config.temperature;
        Ok(Arc::new(client))
    }

    /// Create the completion client and the uploader, sharing one HTTP client.
    pub fn create(
        config: &ProviderConfig,
    ) -> Result<(Arc<dyn ModelProviderClient>, Arc<dyn FileUploader>), ApiError> {
        let client = Self::build(config)?;
        let uploader: Arc<dyn FileUploader> = client.clone();
        let client: Arc<dyn ModelProviderClient> = client;
        Ok((client, uploader))
    }

    pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        let client: Arc<dyn ModelProviderClient> = Self::build(config)?;
        Ok(client)
    }
}

// Mock provider for testing
#[cfg(test)]
pub struct MockProvider {
    responses: Vec<String>,
    current: parking_lot::Mutex<usize>,
    model_name: String,
}

#[cfg(test)]
impl MockProvider {
    pub fn new(model_name: String, responses: Vec<String>) -> Self {
        Self {
            responses,
            current: parking_lot::Mutex::new(0),
            model_name,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ModelProviderClient for MockProvider {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let mut idx = self.current.lock();
        let response = self
            .responses
            .get(*idx)
            .cloned()
            .unwrap_or_else(|| "{}".to_string());
        *idx += 1;

        Ok(CompletionResponse {
            content: response,
            model: self.model_name.clone(),
            usage: TokenUsage::new(10, 20),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
