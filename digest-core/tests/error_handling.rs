use digest_core::{
    ConfigError, CoreError, EmailError, ErrorExt, LlmError, NotificationError, RedditApiError,
    TtsError,
};

#[test]
fn test_codes_come_from_the_failing_service() {
    let cases: Vec<(CoreError, &str)> = vec![
        (RedditApiError::InvalidToken.into(), "REDDIT_INVALID_TOKEN"),
        (
            RedditApiError::NoPostsFound { subreddits: 3 }.into(),
            "REDDIT_NO_POSTS",
        ),
        (
            LlmError::AnalysisTooShort {
                length: 12,
                minimum: 100,
            }
            .into(),
            "LLM_ANALYSIS_TOO_SHORT",
        ),
        (EmailError::MissingCredentials.into(), "EMAIL_MISSING_CREDENTIALS"),
        (TtsError::NoAudio.into(), "TTS_NO_AUDIO"),
        (
            ConfigError::UnknownTimezone {
                timezone: "Mars/Olympus".to_string(),
            }
            .into(),
            "CONFIG_UNKNOWN_TIMEZONE",
        ),
        (
            CoreError::Internal {
                message: "join failed".to_string(),
            },
            "INTERNAL",
        ),
    ];

    for (error, code) in cases {
        assert_eq!(error.error_code(), code, "{}", error);
    }
}

#[test]
fn test_user_friendly_messages() {
    let missing: CoreError = ConfigError::MissingEnvironmentVariable {
        var_name: "REDDIT_CLIENT_ID, GOOGLE_API_KEY".to_string(),
    }
    .into();
    assert_eq!(
        missing.user_friendly_message(),
        "Missing environment variables: REDDIT_CLIENT_ID, GOOGLE_API_KEY"
    );

    let model: CoreError = LlmError::ModelNotAvailable {
        model: "claude".to_string(),
    }
    .into();
    assert!(model.user_friendly_message().contains("'claude'"));

    let short: CoreError = LlmError::AnalysisTooShort {
        length: 5,
        minimum: 100,
    }
    .into();
    assert_eq!(short.user_friendly_message(), "Analysis too short or empty.");

    let rejected: CoreError = NotificationError::Rejected {
        method: "sendMessage".to_string(),
        description: "chat not found".to_string(),
    }
    .into();
    assert!(rejected.user_friendly_message().contains("chat not found"));

    let subreddit: CoreError = RedditApiError::SubredditNotFound {
        subreddit: "doesnotexist".to_string(),
    }
    .into();
    assert!(subreddit.user_friendly_message().starts_with("r/doesnotexist"));
}

#[test]
fn test_error_display_includes_context() {
    let error = CoreError::Email(EmailError::LoginFailed {
        address: "me@example.com".to_string(),
        reason: "AUTHENTICATIONFAILED".to_string(),
    });
    let rendered = error.to_string();
    assert!(rendered.starts_with("Email error:"));
    assert!(rendered.contains("me@example.com"));
    assert!(rendered.contains("AUTHENTICATIONFAILED"));
}

#[test]
fn test_logging_returns_the_error() {
    let error: CoreError = TtsError::UnknownVoice {
        voice: "Robot".to_string(),
    }
    .into();
    let logged = error.log_error().log_warn();
    assert_eq!(logged.error_code(), "TTS_UNKNOWN_VOICE");
}
