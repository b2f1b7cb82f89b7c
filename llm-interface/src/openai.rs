//! OpenAI chat completions client.

use crate::{api_model_name, http_client, network_error, retry_after, status_error};
use crate::{GenerationRequest, LlmProvider};
use async_trait::async_trait;
use digest_core::{CoreError, LlmError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_completion_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionRequest {
    pub fn from_generation(request: &GenerationRequest) -> Self {
        let settings = &request.settings;
        Self {
            model: api_model_name(&request.model).to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(request.system_prompt.clone()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(request.prompt.clone()),
                },
            ],
            max_completion_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        }
    }
}

pub fn extract_text(response: ChatCompletionResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: "response has no choices".to_string(),
        })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::ContentFiltered {
            reason: "content_filter".to_string(),
        });
    }
    if choice.finish_reason.as_deref() == Some("length") {
        warn!("OpenAI output was cut at the token limit");
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
            details: "empty message content".to_string(),
        }),
    }
}

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Result<Self, CoreError> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CoreError> {
        let body = ChatCompletionRequest::from_generation(request);
        let url = format!("{}/chat/completions", self.base_url);

        info!("Calling OpenAI {} ({} prompt chars)", body.model, request.prompt.len());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry = retry_after(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, &body.model, status, retry, &text).into());
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
                details: e.to_string(),
            })
        })?;

        Ok(extract_text(parsed)?)
    }
}
