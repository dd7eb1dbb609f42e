use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const COMPLETIONS_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 60; // 60 second timeout for API requests

/// Message role in a completion request.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a mixed-content message (text or image).
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Clone)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    /// Build an image part from raw bytes as a base64 data URL.
    pub fn image_from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let url = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
        ContentPart::image_url(url)
    }
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Clone)]
pub struct RoleMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl RoleMessage {
    pub fn system(text: impl Into<String>) -> Self {
        RoleMessage {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        RoleMessage {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        RoleMessage {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        RoleMessage {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<RoleMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Failure issuing or resolving a completion request. Call sites never show
/// these to the user directly; each substitutes its own fixed apology text.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("completion API returned no choices")]
    Empty,
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        GatewayConfig {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: COMPLETIONS_API_URL.to_string(),
        }
    }

    /// Read the API key from OPENAI_API_KEY, and the model from SOLACE_MODEL
    /// when set.
    pub fn from_env() -> Result<Self, GatewayError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| GatewayError::MissingApiKey)?;
        let mut config = GatewayConfig::new(api_key);
        if let Ok(model) = std::env::var("SOLACE_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Stateless client for the chat-completions endpoint. Holds no session
/// data; every call is a single POST with no retry.
#[derive(Clone)]
pub struct CompletionGateway {
    client: Client,
    config: GatewayConfig,
}

impl CompletionGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    /// Send role-tagged messages and return the first choice's text.
    pub async fn complete(&self, messages: &[RoleMessage]) -> Result<String, GatewayError> {
        debug_assert!(!messages.is_empty(), "completion request needs at least one message");

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }

        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or(GatewayError::Empty)
    }

    /// Check the key with a one-word request. Ok(false) means the key
    /// was rejected; other failures are surfaced as errors.
    pub async fn validate_api_key(&self) -> Result<bool, GatewayError> {
        let messages = vec![RoleMessage::user("Say 'ok'")];

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(true);
        }

        let status = response.status().as_u16();
        if status == 401 {
            return Ok(false);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api { status, body })
    }
}
