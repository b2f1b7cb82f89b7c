//! Error types shared by every crate in the workspace.
//!
//! Each external service has its own enum; `CoreError` wraps them so a run
//! can propagate any failure with `?`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Text-to-speech error: {0}")]
    Tts(#[from] TtsError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A background task died or returned something impossible.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// 429 from the API, or the local token bucket ran dry.
    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Access to {resource} is forbidden")]
    Forbidden { resource: String },

    #[error("Subreddit r/{subreddit} not found")]
    SubredditNotFound { subreddit: String },

    #[error("Post {post_id} not found")]
    PostNotFound { post_id: String },

    /// 401 with a cached token; the client drops it and re-authenticates.
    #[error("Access token rejected")]
    InvalidToken,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unexpected response: {details}")]
    InvalidResponse { details: String },

    #[error("Server returned {status_code}")]
    ServerError { status_code: u16 },

    /// Every configured subreddit failed or returned nothing.
    #[error("No posts from any of {subreddits} subreddits")]
    NoPostsFound { subreddits: usize },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{provider} rejected the credentials")]
    AuthenticationFailed { provider: String },

    #[error("API key for {provider} is invalid or missing")]
    InvalidApiKey { provider: String },

    #[error("{provider} rate limit hit, retry after {retry_after}s")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Model {model} is not available")]
    ModelNotAvailable { model: String },

    #[error("Prompt rejected: {reason}")]
    InvalidPrompt { reason: String },

    #[error("Blocked by the provider: {reason}")]
    ContentFiltered { reason: String },

    #[error("{provider} is unavailable")]
    ServiceUnavailable { provider: String },

    #[error("{provider} did not answer in time")]
    RequestTimeout { provider: String },

    #[error("Unexpected response from {provider}: {details}")]
    InvalidResponseFormat { provider: String, details: String },

    #[error("Analysis has {length} characters, at least {minimum} required")]
    AnalysisTooShort { length: usize, minimum: usize },
}

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email address or app password not configured")]
    MissingCredentials,

    #[error("Connection to {server} failed: {reason}")]
    ConnectionFailed { server: String, reason: String },

    #[error("Login failed for {address}: {reason}")]
    LoginFailed { address: String, reason: String },

    #[error("IMAP command failed: {reason}")]
    Protocol { reason: String },

    #[error("Message could not be parsed: {reason}")]
    Parse { reason: String },
}

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("API key for {provider} is invalid or missing")]
    InvalidApiKey { provider: String },

    #[error("Unknown voice: {voice}")]
    UnknownVoice { voice: String },

    #[error("Synthesis failed with status {status_code}: {details}")]
    SynthesisFailed { status_code: u16, details: String },

    #[error("Response contained no audio")]
    NoAudio,

    #[error("Audio payload could not be decoded: {reason}")]
    InvalidAudio { reason: String },

    #[error("WAV encoding failed: {reason}")]
    Encoding { reason: String },
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Bot token or chat id not configured")]
    MissingCredentials,

    #[error("Bot API rejected {method}: {description}")]
    Rejected { method: String, description: String },

    #[error("Attachment not readable: {path}")]
    AttachmentUnreadable { path: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid settings: {details}")]
    InvalidFormat { details: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// `var_name` may list several comma separated names.
    #[error("Missing environment variables: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("Settings file could not be parsed: {0}")]
    Parse(#[from] toml::de::Error),
}
