//! How errors are presented: log lines, text for the page and the chat
//! channel, and stable codes stored with failed scheduled runs.

use crate::error::*;
use std::fmt;
use tracing::{debug, error, warn};

pub trait ErrorExt: fmt::Display + fmt::Debug {
    /// Stable upper-case identifier, e.g. `REDDIT_NO_POSTS`.
    fn error_code(&self) -> String;

    /// One sentence a user can act on.
    fn user_friendly_message(&self) -> String;

    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(code = %self.error_code(), "{}", self);
        debug!("{:?}", self);
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = %self.error_code(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Llm(e) => e.error_code(),
            CoreError::Email(e) => e.error_code(),
            CoreError::Tts(e) => e.error_code(),
            CoreError::Notification(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Io(_) => "IO".into(),
            CoreError::Serialization(_) => "SERIALIZATION".into(),
            CoreError::Network(_) => "NETWORK".into(),
            CoreError::Internal { .. } => "INTERNAL".into(),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Email(e) => e.user_friendly_message(),
            CoreError::Tts(e) => e.user_friendly_message(),
            CoreError::Notification(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Io(e) => format!("Could not read or write output files: {}", e),
            CoreError::Serialization(e) => format!("Could not encode or decode data: {}", e),
            CoreError::Network(e) if e.is_timeout() => {
                "A request timed out. Try again in a few minutes.".to_string()
            }
            CoreError::Network(_) => {
                "Could not reach the service. Check the internet connection.".to_string()
            }
            CoreError::Internal { message } => format!("Unexpected internal error: {}", message),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn error_code(&self) -> String {
        let code = match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT",
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN",
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND",
            RedditApiError::PostNotFound { .. } => "REDDIT_POST_NOT_FOUND",
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN",
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT",
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE",
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR",
            RedditApiError::NoPostsFound { .. } => "REDDIT_NO_POSTS",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit did not accept REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET.".to_string()
            }
            RedditApiError::InvalidToken => {
                "Reddit rejected the access token. The next run requests a new one.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => {
                format!("Reddit is rate limiting requests. Wait {}s.", retry_after)
            }
            RedditApiError::Forbidden { resource } => format!("Reddit denied access to {}.", resource),
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("r/{} does not exist or is private.", subreddit)
            }
            RedditApiError::PostNotFound { post_id } => format!("Post {} was removed.", post_id),
            RedditApiError::RequestTimeout => "Reddit did not answer in time.".to_string(),
            RedditApiError::NoPostsFound { .. } => {
                "No posts were fetched. Check the subreddit names and the time filter.".to_string()
            }
            RedditApiError::InvalidResponse { .. } | RedditApiError::ServerError { .. } => {
                "Reddit returned an error. Try again later.".to_string()
            }
        }
    }
}

impl ErrorExt for LlmError {
    fn error_code(&self) -> String {
        let code = match self {
            LlmError::AuthenticationFailed { .. } => "LLM_AUTH_FAILED",
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY",
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT",
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE",
            LlmError::InvalidPrompt { .. } => "LLM_INVALID_PROMPT",
            LlmError::ContentFiltered { .. } => "LLM_CONTENT_FILTERED",
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE",
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT",
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE",
            LlmError::AnalysisTooShort { .. } => "LLM_ANALYSIS_TOO_SHORT",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::AuthenticationFailed { provider } | LlmError::InvalidApiKey { provider } => {
                format!("The {} API key was rejected. Check the configured key.", provider)
            }
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!("{} is rate limiting requests. Wait {}s.", provider, retry_after),
            LlmError::ModelNotAvailable { model } => format!(
                "Model '{}' is not supported. Pick a 'gemini-*' or 'openai:*' model.",
                model
            ),
            LlmError::InvalidPrompt { reason } => format!("The prompt was rejected: {}", reason),
            LlmError::ContentFiltered { reason } => {
                format!("The provider blocked the response: {}", reason)
            }
            LlmError::ServiceUnavailable { provider } | LlmError::RequestTimeout { provider } => {
                format!("{} is not responding. Try again later.", provider)
            }
            LlmError::InvalidResponseFormat { provider, .. } => {
                format!("{} returned a response that could not be read.", provider)
            }
            LlmError::AnalysisTooShort { .. } => "Analysis too short or empty.".to_string(),
        }
    }
}

impl ErrorExt for EmailError {
    fn error_code(&self) -> String {
        let code = match self {
            EmailError::MissingCredentials => "EMAIL_MISSING_CREDENTIALS",
            EmailError::ConnectionFailed { .. } => "EMAIL_CONNECTION_FAILED",
            EmailError::LoginFailed { .. } => "EMAIL_LOGIN_FAILED",
            EmailError::Protocol { .. } => "EMAIL_PROTOCOL",
            EmailError::Parse { .. } => "EMAIL_PARSE",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            EmailError::MissingCredentials => {
                "Set an email address and app password to include newsletters.".to_string()
            }
            EmailError::ConnectionFailed { server, .. } => {
                format!("Could not connect to {}.", server)
            }
            EmailError::LoginFailed { address, .. } => {
                format!("Login failed for {}. Use an app password.", address)
            }
            EmailError::Protocol { reason } | EmailError::Parse { reason } => {
                format!("Reading the mailbox failed: {}", reason)
            }
        }
    }
}

impl ErrorExt for TtsError {
    fn error_code(&self) -> String {
        let code = match self {
            TtsError::InvalidApiKey { .. } => "TTS_INVALID_API_KEY",
            TtsError::UnknownVoice { .. } => "TTS_UNKNOWN_VOICE",
            TtsError::SynthesisFailed { .. } => "TTS_SYNTHESIS_FAILED",
            TtsError::NoAudio => "TTS_NO_AUDIO",
            TtsError::InvalidAudio { .. } => "TTS_INVALID_AUDIO",
            TtsError::Encoding { .. } => "TTS_ENCODING",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TtsError::InvalidApiKey { provider } => {
                format!("Audio narration needs a valid {} API key.", provider)
            }
            TtsError::UnknownVoice { voice } => format!("Voice '{}' is not available.", voice),
            _ => "Audio narration could not be generated.".to_string(),
        }
    }
}

impl ErrorExt for NotificationError {
    fn error_code(&self) -> String {
        let code = match self {
            NotificationError::MissingCredentials => "NOTIFY_MISSING_CREDENTIALS",
            NotificationError::Rejected { .. } => "NOTIFY_REJECTED",
            NotificationError::AttachmentUnreadable { .. } => "NOTIFY_ATTACHMENT",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotificationError::MissingCredentials => {
                "Set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID to send results.".to_string()
            }
            NotificationError::Rejected { description, .. } => {
                format!("Telegram rejected the message: {}", description)
            }
            NotificationError::AttachmentUnreadable { path } => {
                format!("Could not read attachment {}.", path)
            }
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> String {
        let code = match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR",
            ConfigError::UnknownTimezone { .. } => "CONFIG_UNKNOWN_TIMEZONE",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        };
        code.into()
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("Settings file {} does not exist.", path),
            ConfigError::InvalidFormat { details } => format!("Invalid settings: {}", details),
            ConfigError::Parse(e) => format!("Settings file could not be parsed: {}", e),
            ConfigError::MissingField { field } => format!("'{}' is required.", field),
            ConfigError::InvalidValue { field, value } => {
                format!("'{}' is not a valid value for {}.", value, field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => {
                format!("Missing environment variables: {}", var_name)
            }
            ConfigError::UnknownTimezone { timezone } => format!(
                "Unknown timezone '{}'. Use an IANA name such as Europe/London.",
                timezone
            ),
        }
    }
}
