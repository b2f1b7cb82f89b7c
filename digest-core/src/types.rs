use crate::defaults::*;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Look-back window applied to a subreddit "top" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TimeFilter::ALL
            .into_iter()
            .find(|filter| filter.as_str() == needle)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "time_filter".to_string(),
                value: s.to_string(),
            })
    }
}

/// Ordered mapping from subreddit name to the number of top posts to fetch.
///
/// Persisted and edited in the `Name:Limit, Name2:Limit` text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubredditConfig {
    entries: Vec<(String, u32)>,
}

impl SubredditConfig {
    pub fn new(entries: Vec<(String, u32)>) -> Self {
        Self { entries }
    }

    /// Parse `"LocalLLaMA:10, artificial:5"`. Pairs without a colon are
    /// ignored; pairs with a non-numeric limit are logged and ignored.
    pub fn parse(input: &str) -> Self {
        let mut entries: Vec<(String, u32)> = Vec::new();

        for pair in input.split(',') {
            let pair = pair.trim();
            let Some((name, limit)) = pair.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match limit.trim().parse::<u32>() {
                Ok(limit) => {
                    // Later duplicates override earlier ones but keep the first position
                    if let Some(existing) = entries.iter_mut().find(|(n, _)| n == name) {
                        existing.1 = limit;
                    } else {
                        entries.push((name.to_string(), limit));
                    }
                }
                Err(_) => {
                    tracing::warn!("Invalid limit for {}: {}", name, limit.trim());
                }
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[(String, u32)] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for SubredditConfig {
    fn default() -> Self {
        Self {
            entries: DEFAULT_SUBREDDITS
                .iter()
                .map(|(name, limit)| (name.to_string(), *limit))
                .collect(),
        }
    }
}

impl fmt::Display for SubredditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|(name, limit)| format!("{}:{}", name, limit))
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

impl From<String> for SubredditConfig {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SubredditConfig> for String {
    fn from(value: SubredditConfig) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Gemini only.
    pub top_k: u32,
    /// Gemini only.
    pub thinking_budget: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            thinking_budget: DEFAULT_THINKING_BUDGET,
        }
    }
}

impl GenerationSettings {
    /// Copy with `max_output_tokens` capped at what `model` accepts.
    pub fn clamped_for(&self, model: &str) -> Self {
        Self {
            max_output_tokens: self.max_output_tokens.min(model_max_tokens(model)),
            thinking_budget: self.thinking_budget.min(MAX_THINKING_BUDGET),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailOptions {
    pub enabled: bool,
    /// Overrides `EMAIL_ADDRESS` when set.
    pub address: Option<String>,
    /// Overrides `EMAIL_PASSWORD` for a single run. Never written to disk.
    #[serde(skip)]
    pub password: Option<String>,
    pub allowed_senders: Vec<String>,
    pub hours_back: u32,
    pub max_emails: u32,
}

impl Default for EmailOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            address: None,
            password: None,
            allowed_senders: DEFAULT_ALLOWED_SENDERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hours_back: DEFAULT_EMAIL_HOURS_BACK,
            max_emails: DEFAULT_MAX_EMAILS,
        }
    }
}

impl EmailOptions {
    /// Split a comma separated sender list, dropping blanks.
    pub fn parse_senders(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsOptions {
    pub enabled: bool,
    pub model: String,
    pub voice: String,
    pub tone_instructions: Option<String>,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            tone_instructions: Some(DEFAULT_TONE_INSTRUCTIONS.to_string()),
        }
    }
}

/// Every parameter of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub subreddits: SubredditConfig,
    pub time_filter: TimeFilter,
    pub top_comments: u32,
    pub replies_per_comment: u32,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub generation: GenerationSettings,
    pub send_to_chat: bool,
    pub email: EmailOptions,
    pub tts: TtsOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            subreddits: SubredditConfig::default(),
            time_filter: TimeFilter::default(),
            top_comments: DEFAULT_TOP_COMMENTS,
            replies_per_comment: DEFAULT_REPLIES_PER_COMMENT,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
            generation: GenerationSettings::default(),
            send_to_chat: false,
            email: EmailOptions::default(),
            tts: TtsOptions::default(),
        }
    }
}

fn invalid(field: &str, value: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

impl RunConfig {
    /// Check field ranges; the first offending field is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subreddits.is_empty() {
            return Err(invalid(
                "subreddits",
                "empty (use SubredditName:PostLimit)",
            ));
        }
        if let Some((name, _)) = self.subreddits.entries().iter().find(|(_, l)| *l == 0) {
            return Err(invalid("subreddits", format!("{}:0", name)));
        }
        if !(1..=MAX_TOP_COMMENTS).contains(&self.top_comments) {
            return Err(invalid("top_comments", self.top_comments));
        }
        if !(1..=MAX_REPLIES_PER_COMMENT).contains(&self.replies_per_comment) {
            return Err(invalid("replies_per_comment", self.replies_per_comment));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "model".to_string(),
            });
        }

        let generation = &self.generation;
        if generation.max_output_tokens == 0 {
            return Err(invalid("max_output_tokens", generation.max_output_tokens));
        }
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(invalid("temperature", generation.temperature));
        }
        if !(0.0..=1.0).contains(&generation.top_p) {
            return Err(invalid("top_p", generation.top_p));
        }
        if !(1..=100).contains(&generation.top_k) {
            return Err(invalid("top_k", generation.top_k));
        }
        if generation.thinking_budget > MAX_THINKING_BUDGET {
            return Err(invalid("thinking_budget", generation.thinking_budget));
        }

        if self.email.enabled {
            if !(1..=MAX_EMAIL_HOURS_BACK).contains(&self.email.hours_back) {
                return Err(invalid("email_hours_back", self.email.hours_back));
            }
            if !(1..=MAX_EMAILS).contains(&self.email.max_emails) {
                return Err(invalid("max_emails", self.email.max_emails));
            }
        }

        if self.tts.enabled && self.tts.voice.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "voice".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub subreddit: String,
    /// `https://reddit.com` + permalink.
    pub url: String,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditComment {
    pub score: i64,
    pub body: String,
    pub replies: Vec<RedditComment>,
}

/// A post together with its selected top-level comments and replies.
#[derive(Debug, Clone, PartialEq)]
pub struct PostThread {
    pub post: RedditPost,
    pub comments: Vec<RedditComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
}

/// Paths of everything a successful run wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_folder: PathBuf,
    pub analysis_file: PathBuf,
    pub raw_data_file: PathBuf,
    pub llm_input_file: PathBuf,
    pub email_file: Option<PathBuf>,
    pub audio_file: Option<PathBuf>,
    pub posts_analyzed: usize,
    pub analysis: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subreddit_config_parsing() {
        let config = SubredditConfig::parse("LocalLLaMA:10, artificial:5,MachineLearning : 2");
        assert_eq!(
            config.entries(),
            &[
                ("LocalLLaMA".to_string(), 10),
                ("artificial".to_string(), 5),
                ("MachineLearning".to_string(), 2),
            ]
        );
        assert_eq!(
            config.to_string(),
            "LocalLLaMA:10, artificial:5, MachineLearning:2"
        );
    }

    #[test]
    fn test_subreddit_config_skips_bad_pairs() {
        let config = SubredditConfig::parse("rust, golang:abc, python:3, :4");
        assert_eq!(config.entries(), &[("python".to_string(), 3)]);

        assert!(SubredditConfig::parse("").is_empty());
    }

    #[test]
    fn test_subreddit_config_serializes_as_text() {
        let config = SubredditConfig::parse("rust:3, golang:1");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, "\"rust:3, golang:1\"");

        let back: SubredditConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_time_filter_parsing() {
        assert_eq!("week".parse::<TimeFilter>().unwrap(), TimeFilter::Week);
        assert_eq!(" ALL ".parse::<TimeFilter>().unwrap(), TimeFilter::All);
        assert!("fortnight".parse::<TimeFilter>().is_err());
        assert_eq!(TimeFilter::default().to_string(), "day");
    }

    #[test]
    fn test_generation_clamped_for_model() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.clamped_for("gemini-2.5-pro").max_output_tokens, 65535);
        assert_eq!(settings.clamped_for("gemini-2.5-flash").max_output_tokens, 8192);
        assert_eq!(settings.clamped_for("openai:gpt-5").max_output_tokens, 32768);
        assert_eq!(settings.clamped_for("mystery-model").max_output_tokens, 8192);

        let small = GenerationSettings {
            max_output_tokens: 2048,
            ..GenerationSettings::default()
        };
        assert_eq!(small.clamped_for("gemini-2.5-pro").max_output_tokens, 2048);
    }

    #[test]
    fn test_default_run_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_reports_field() {
        let config = RunConfig {
            top_comments: 11,
            ..RunConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "top_comments"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        let config = RunConfig {
            subreddits: SubredditConfig::parse("nothing here"),
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.generation.temperature = 2.5;
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "temperature"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_email_limits_only_checked_when_enabled() {
        let mut config = RunConfig::default();
        config.email.max_emails = 0;
        assert!(config.validate().is_ok());

        config.email.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_password_is_never_serialized() {
        let mut config = RunConfig::default();
        config.email.password = Some("hunter2".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));

        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.email.password, None);
    }

    #[test]
    fn test_sender_list_parsing() {
        assert_eq!(
            EmailOptions::parse_senders(" a@x.com, ,b@y.org "),
            vec!["a@x.com".to_string(), "b@y.org".to_string()]
        );
    }
}
