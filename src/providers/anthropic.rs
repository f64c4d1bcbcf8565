use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::app_config::AnthropicConfig;
use crate::errors::ProviderError;
use crate::providers::{MtEngine, PostEditRequest, PostEditor};
use crate::translation::prompts::{PostEditPromptBuilder, PromptTemplate, build_batch_prompt, parse_batch_response};

/// Anthropic client for interacting with Anthropic API
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL (optional, defaults to public API)
    endpoint: String,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Complete a messages request
    pub async fn complete(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let api_url = if self.endpoint.is_empty() {
            "https://api.anthropic.com/v1/messages".to_string()
        } else {
            format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
        };

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Anthropic API error ({}): {}", status, error_text);
            return Err(map_status_error(status, error_text));
        }

        let anthropic_response = response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Anthropic response: {}", e)))?;
        debug!(
            "Anthropic usage: {} input / {} output tokens",
            anthropic_response.usage.input_tokens, anthropic_response.usage.output_tokens
        );

        Ok(anthropic_response)
    }

    /// Extract text from Anthropic response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::RequestFailed(format!("request timed out: {}", e))
    } else if e.is_connect() {
        ProviderError::ConnectionError(e.to_string())
    } else {
        ProviderError::RequestFailed(e.to_string())
    }
}

fn map_status_error(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message,
        },
    }
}

/// Anthropic-backed MT engine and post-editor
#[derive(Debug)]
pub struct AnthropicAdapter {
    client: Anthropic,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicAdapter {
    /// Build the adapter from its configuration section
    pub fn from_config(config: &AnthropicConfig, api_key: String) -> Self {
        Self {
            client: Anthropic::new(api_key, config.endpoint.clone(), Duration::from_secs(config.timeout_secs)),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    async fn ask(&self, system: String, user: String) -> Result<String, ProviderError> {
        let request = AnthropicRequest::new(&self.model, self.max_tokens)
            .system(system)
            .temperature(self.temperature)
            .add_message("user", user);

        let response = self.client.complete(request).await?;
        Ok(Anthropic::extract_text_from_response(&response))
    }
}

#[async_trait]
impl MtEngine for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let system = PromptTemplate::machine_translator().render(source_language, target_language);
        let response = self.ask(system, build_batch_prompt(texts)).await?;
        parse_batch_response(&response, texts.len())
    }
}

#[async_trait]
impl PostEditor for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn post_edit(&self, request: &PostEditRequest) -> Result<String, ProviderError> {
        let (system, user) = PostEditPromptBuilder::new(request).build();
        let edited = self.ask(system, user).await?;
        let edited = edited.trim();
        if edited.is_empty() {
            return Err(ProviderError::ParseError("empty post-edit response".to_string()));
        }
        Ok(edited.to_string())
    }
}
