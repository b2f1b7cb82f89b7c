pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use digest_core::{CoreError, GenerationSettings, LlmError, LlmSettings};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Analyses shorter than this are treated as failed generations.
pub const MIN_ANALYSIS_CHARS: usize = 100;

/// Generation can take minutes for long corpora with thinking enabled.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const OPENAI_PREFIX: &str = "openai:";

/// Which backend a model name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Gemini,
    OpenAi,
}

impl ModelFamily {
    pub fn of(model: &str) -> Option<Self> {
        if model.starts_with("gemini") {
            Some(ModelFamily::Gemini)
        } else if model.starts_with(OPENAI_PREFIX) {
            Some(ModelFamily::OpenAi)
        } else {
            None
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            ModelFamily::Gemini => "gemini",
            ModelFamily::OpenAi => "openai",
        }
    }
}

/// Model name as the provider's API expects it.
pub fn api_model_name(model: &str) -> &str {
    model.strip_prefix(OPENAI_PREFIX).unwrap_or(model)
}

pub fn build_prompt(user_prompt: &str, corpus: &str) -> String {
    format!("{}\n\nAnalyze this Reddit data:\n{}", user_prompt, corpus)
}

/// One complete generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub settings: GenerationSettings,
}

impl GenerationRequest {
    /// Build the request for `corpus`, capping output tokens at what the
    /// model accepts.
    pub fn new(
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        corpus: &str,
        settings: &GenerationSettings,
    ) -> Self {
        Self {
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            prompt: build_prompt(user_prompt, corpus),
            settings: settings.clamped_for(model),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CoreError>;
}

/// Reject analyses too short to be a real report.
pub fn ensure_substantial(analysis: &str) -> Result<(), LlmError> {
    let length = analysis.trim().chars().count();
    if length < MIN_ANALYSIS_CHARS {
        return Err(LlmError::AnalysisTooShort {
            length,
            minimum: MIN_ANALYSIS_CHARS,
        });
    }
    Ok(())
}

/// Dispatches a request to the provider owning its model name.
#[derive(Default, Clone)]
pub struct ModelRouter {
    gemini: Option<Arc<dyn LlmProvider>>,
    openai: Option<Arc<dyn LlmProvider>>,
}

impl ModelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for every family that has an API key.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, CoreError> {
        let mut router = Self::new();
        if let Some(key) = &settings.google_api_key {
            let provider = GeminiProvider::new(key.clone())?;
            router = router.with_provider(ModelFamily::Gemini, Arc::new(provider));
        }
        if let Some(key) = &settings.openai_api_key {
            let provider = OpenAiProvider::new(key.clone())?;
            router = router.with_provider(ModelFamily::OpenAi, Arc::new(provider));
        }
        Ok(router)
    }

    pub fn with_provider(mut self, family: ModelFamily, provider: Arc<dyn LlmProvider>) -> Self {
        match family {
            ModelFamily::Gemini => self.gemini = Some(provider),
            ModelFamily::OpenAi => self.openai = Some(provider),
        }
        self
    }

    pub fn provider_for(&self, model: &str) -> Result<&Arc<dyn LlmProvider>, LlmError> {
        let family = ModelFamily::of(model).ok_or_else(|| LlmError::ModelNotAvailable {
            model: model.to_string(),
        })?;
        let provider = match family {
            ModelFamily::Gemini => self.gemini.as_ref(),
            ModelFamily::OpenAi => self.openai.as_ref(),
        };
        provider.ok_or_else(|| LlmError::InvalidApiKey {
            provider: family.provider_name().to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for ModelRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CoreError> {
        let provider = self.provider_for(&request.model)?;
        let settings = &request.settings;
        info!(
            "Running analysis with {} via {} (max_tokens={}, temp={}, top_p={}, top_k={}, thinking={})",
            request.model,
            provider.name(),
            settings.max_output_tokens,
            settings.temperature,
            settings.top_p,
            settings.top_k,
            settings.thinking_budget
        );

        let analysis = provider.generate(request).await?;
        info!("Analysis complete: {} characters", analysis.len());
        Ok(analysis)
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, CoreError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

pub(crate) fn network_error(provider: &str, error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::Llm(LlmError::RequestTimeout {
            provider: provider.to_string(),
        })
    } else {
        CoreError::Network(error)
    }
}

pub(crate) fn status_error(
    provider: &str,
    model: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> LlmError {
    warn!("{} returned status {}: {}", provider, status, body);
    let provider = provider.to_string();
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(60),
        },
        400 => LlmError::InvalidPrompt {
            reason: extract_error_message(body).unwrap_or_else(|| body.to_string()),
        },
        _ if status.is_server_error() => LlmError::ServiceUnavailable { provider },
        code => LlmError::InvalidResponseFormat {
            provider,
            details: format!("unexpected status {}", code),
        },
    }
}

pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Both providers wrap failures as `{"error": {"message": ...}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}
