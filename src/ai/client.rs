//! Assistant backends
//!
//! `AssistantBackend` is the narrow capability the mediator depends on; tests
//! substitute deterministic stubs. `AnthropicBackend` talks to a Messages API
//! endpoint over blocking HTTP.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Messages API endpoint
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model - small and fast, the guidance is short
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// Default request timeout (ms)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default max output tokens
pub const DEFAULT_MAX_TOKENS: u32 = 600;

/// Longest guidance accepted from the assistant, in characters
pub const DEFAULT_MAX_RESPONSE_LENGTH: usize = 1200;

/// Advisory cache lifetime (s)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Assistant configuration, owned by the orchestrator and injected into the mediator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Escalate WATCH/URGENT results to the assistant at all
    pub enabled: bool,
    /// Messages API URL (proxies supported)
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub max_response_length: usize,
    /// 0 disables the advisory cache
    pub cache_ttl_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: ANTHROPIC_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Normalize a base URL so it ends with `/v1/messages`
pub fn normalize_endpoint(url: &str) -> String {
    let u = url.trim().trim_end_matches('/');
    if u.ends_with("/v1/messages") {
        u.to_string()
    } else if u.ends_with("/v1") {
        format!("{}/messages", u)
    } else {
        format!("{}/v1/messages", u)
    }
}

/// Prompt handed to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantPrompt {
    pub system: String,
    pub user: String,
}

impl AssistantPrompt {
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }
}

/// External language-model capability
pub trait AssistantBackend: Send + Sync {
    /// Produce free text for `prompt`, giving up after `timeout`
    fn generate(&self, prompt: &AssistantPrompt, timeout: Duration) -> Result<String, TransportError>;
}

// ============================================================================
// Messages API wire types
// ============================================================================

#[derive(Serialize)]
pub(crate) struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub(crate) struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

/// Join the text blocks of a successful Messages API body
pub(crate) fn parse_messages_body(body: &str) -> Result<String, TransportError> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;

    Ok(response
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join(""))
}

/// Map a non-success status and body to a provider error
pub(crate) fn provider_error(status: u16, body: &str) -> TransportError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    TransportError::Provider { status, message }
}

// ============================================================================
// AnthropicBackend
// ============================================================================

pub struct AnthropicBackend {
    client: reqwest::blocking::Client,
    config: AssistantConfig,
}

impl AnthropicBackend {
    pub fn new(config: AssistantConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| TransportError::Http(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: AssistantConfig {
                endpoint: normalize_endpoint(&config.endpoint),
                ..config
            },
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl AssistantBackend for AnthropicBackend {
    fn generate(&self, prompt: &AssistantPrompt, timeout: Duration) -> Result<String, TransportError> {
        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: Some(prompt.system.clone()).filter(|s| !s.is_empty()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.user.clone(),
            }],
        };

        debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            endpoint = %self.config.endpoint,
            timeout_ms = timeout.as_millis() as u64,
            "Sending request to assistant"
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(timeout)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Assistant request completed");

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TransportError::Http(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &body));
        }

        let text = parse_messages_body(&body)?;
        if text.is_empty() {
            warn!("Empty response from assistant");
        }
        Ok(text)
    }
}
