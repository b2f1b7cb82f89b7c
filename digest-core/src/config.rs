//! Process-wide settings.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables (a `.env` file in the working directory is loaded
//! first). Credentials are never written back anywhere.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_SETTINGS_FILE: &str = "digest.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "reddit-digest/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub address: Option<String>,
    pub password: Option<String>,
    pub imap_server: String,
    pub imap_port: u16,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            address: None,
            password: None,
            imap_server: "imap.gmail.com".to_string(),
            imap_port: 993,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub reddit: RedditSettings,
    pub llm: LlmSettings,
    pub telegram: TelegramSettings,
    pub email: EmailSettings,
    pub output_dir: PathBuf,
    pub schedule_file: PathBuf,
    pub bind_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reddit: RedditSettings::default(),
            llm: LlmSettings::default(),
            telegram: TelegramSettings::default(),
            email: EmailSettings::default(),
            output_dir: PathBuf::from("outputs"),
            schedule_file: PathBuf::from("scheduler/schedule_config.json"),
            bind_address: "0.0.0.0:7860".to_string(),
        }
    }
}

impl Settings {
    /// Load `.env`, then the settings file (if present), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let settings = Self::from_toml(&contents)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from a variable lookup. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(v);
        }
        if let Some(v) = get("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(v);
        }
        if let Some(v) = get("REDDIT_USER_AGENT") {
            self.reddit.user_agent = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.llm.google_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(v);
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = get("EMAIL_ADDRESS") {
            self.email.address = Some(v);
        }
        if let Some(v) = get("EMAIL_PASSWORD") {
            self.email.password = Some(v);
        }
        if let Some(v) = get("IMAP_SERVER") {
            self.email.imap_server = v;
        }
        if let Some(v) = get("IMAP_PORT") {
            match v.parse() {
                Ok(port) => self.email.imap_port = port,
                Err(_) => warn!("Ignoring invalid IMAP_PORT: {}", v),
            }
        }
        if let Some(v) = get("DIGEST_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DIGEST_SCHEDULE_FILE") {
            self.schedule_file = PathBuf::from(v);
        }
        if let Some(v) = get("DIGEST_BIND") {
            self.bind_address = v;
        }

        if self.email.address.is_some() != self.email.password.is_some() {
            warn!("Incomplete email configuration. Both EMAIL_ADDRESS and EMAIL_PASSWORD required.");
        }
    }

    /// Credentials every run needs.
    pub fn require_reddit(&self) -> Result<(&str, &str), ConfigError> {
        let id = require(&self.reddit.client_id, "REDDIT_CLIENT_ID")?;
        let secret = require(&self.reddit.client_secret, "REDDIT_CLIENT_SECRET")?;
        Ok((id, secret))
    }

    pub fn require_telegram(&self) -> Result<(&str, &str), ConfigError> {
        let token = require(&self.telegram.bot_token, "TELEGRAM_BOT_TOKEN")?;
        let chat = require(&self.telegram.chat_id, "TELEGRAM_CHAT_ID")?;
        Ok((token, chat))
    }

    /// Names of the variables a run with these options would need but lacks.
    pub fn missing_for_run(&self, model: &str, send_to_chat: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.reddit.client_id.is_none() {
            missing.push("REDDIT_CLIENT_ID");
        }
        if self.reddit.client_secret.is_none() {
            missing.push("REDDIT_CLIENT_SECRET");
        }
        if model.starts_with("openai:") {
            if self.llm.openai_api_key.is_none() {
                missing.push("OPENAI_API_KEY");
            }
        } else if self.llm.google_api_key.is_none() {
            missing.push("GOOGLE_API_KEY");
        }
        if send_to_chat {
            if self.telegram.bot_token.is_none() {
                missing.push("TELEGRAM_BOT_TOKEN");
            }
            if self.telegram.chat_id.is_none() {
                missing.push("TELEGRAM_CHAT_ID");
            }
        }
        missing
    }
}

/// Resolve an IANA timezone name such as `Europe/Berlin`.
pub fn parse_timezone(name: &str) -> Result<chrono_tz::Tz, ConfigError> {
    name.trim()
        .parse::<chrono_tz::Tz>()
        .map_err(|_| ConfigError::UnknownTimezone {
            timezone: name.to_string(),
        })
}

fn require<'a>(value: &'a Option<String>, var_name: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
            var_name: var_name.to_string(),
        })
}
