//! Delivery of run results to a Telegram chat through the Bot HTTP API.

use async_trait::async_trait;
use digest_core::{CoreError, NotificationError, Settings, SubredditConfig, TimeFilter};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Longest text the Bot API accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub const AUDIO_TITLE: &str = "Reddit AI Analysis Audio";
pub const DOCUMENT_CAPTION: &str = "📄 Full AI Analysis Report";
pub const AUDIO_CAPTION: &str = "🎙️ Audio Narration of Analysis";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

impl ParseMode {
    fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str, parse_mode: Option<ParseMode>)
        -> Result<(), CoreError>;

    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), CoreError>;

    async fn send_audio(&self, path: &Path, caption: &str, title: &str) -> Result<(), CoreError>;
}

const MARKDOWN_SPECIALS: [char; 3] = ['_', '[', ']'];

/// Escape the characters legacy Markdown treats as entity openers.
pub fn escape_markdown(text: &str) -> String {
    text.replace('_', "\\_")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Split `text` into chunks of at most `limit` chars, cutting at the last
/// newline in range when there is one. A chunk never ends on a lone escape
/// backslash.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    split_weighted(text, limit, |_| 1)
}

/// Like [`split_message`], but sized so that every chunk still fits in
/// `limit` after [`escape_markdown`].
pub fn split_for_markdown(text: &str, limit: usize) -> Vec<String> {
    split_weighted(text, limit, |c| {
        if MARKDOWN_SPECIALS.contains(&c) {
            2
        } else {
            1
        }
    })
}

fn split_weighted(text: &str, limit: usize, weight: impl Fn(char) -> usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    loop {
        // Number of leading chars whose weight fits in `limit`
        let mut used = 0;
        let fits = rest
            .iter()
            .take_while(|c| {
                used += weight(**c);
                used <= limit
            })
            .count();
        if fits == rest.len() {
            break;
        }

        let window = &rest[..fits.max(1)];
        let mut cut = match window.iter().rposition(|c| *c == '\n') {
            Some(pos) if pos > 0 => pos + 1,
            _ => window.len(),
        };
        if cut > 1 && rest[cut - 1] == '\\' {
            cut -= 1;
        }
        let chunk: String = rest.drain(..cut).collect();
        chunks.push(chunk);
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.into_iter().collect());
    }
    chunks
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    token: String,
    chat_id: String,
    base_url: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, CoreError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            token: token.into(),
            chat_id: chat_id.into(),
            base_url: TELEGRAM_API_BASE.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        let (token, chat_id) = settings
            .require_telegram()
            .map_err(|_| NotificationError::MissingCredentials)?;
        Self::new(token, chat_id)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn check(method: &str, response: reqwest::Response) -> Result<(), CoreError> {
        let status = response.status();
        let body: BotResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => BotResponse {
                ok: false,
                description: Some(format!("HTTP {}: {}", status.as_u16(), e)),
            },
        };

        if status.is_success() && body.ok {
            Ok(())
        } else {
            Err(NotificationError::Rejected {
                method: method.to_string(),
                description: body
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            }
            .into())
        }
    }

    async fn file_part(path: &Path) -> Result<Part, CoreError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| NotificationError::AttachmentUnreadable {
                path: path.display().to_string(),
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Part::bytes(bytes).file_name(name))
    }

    async fn upload(&self, method: &str, form: Form) -> Result<(), CoreError> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?;
        Self::check(method, response).await
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(
        &self,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), CoreError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let body = SendMessage {
                chat_id: &self.chat_id,
                text: &chunk,
                parse_mode: parse_mode.map(|m| m.as_str()),
            };
            let response = self
                .client
                .post(self.method_url("sendMessage"))
                .json(&body)
                .send()
                .await?;
            Self::check("sendMessage", response).await?;
        }
        Ok(())
    }

    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), CoreError> {
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("document", Self::file_part(path).await?);
        self.upload("sendDocument", form).await?;
        info!("Document sent to Telegram: {}", path.display());
        Ok(())
    }

    async fn send_audio(&self, path: &Path, caption: &str, title: &str) -> Result<(), CoreError> {
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("title", title.to_string())
            .part("audio", Self::file_part(path).await?);
        self.upload("sendAudio", form).await?;
        info!("Audio sent to Telegram: {}", path.display());
        Ok(())
    }
}

/// Send `text` as escaped Markdown, one chunk at a time. When the API
/// rejects a formatted chunk, that chunk and the ones after it go out as
/// plain text; chunks already delivered are not sent again.
pub async fn send_formatted(notifier: &dyn Notifier, text: &str) -> bool {
    let mut plain = false;

    for chunk in split_for_markdown(text, MAX_MESSAGE_CHARS) {
        if !plain {
            match notifier
                .send_message(&escape_markdown(&chunk), Some(ParseMode::Markdown))
                .await
            {
                Ok(()) => continue,
                Err(e) => {
                    warn!("Error sending Telegram message: {}", e);
                    plain = true;
                }
            }
        }
        if let Err(e) = notifier.send_message(&chunk, None).await {
            warn!("Plain text retry failed: {}", e);
            return false;
        }
    }

    if plain {
        info!("Message sent without formatting");
    } else {
        info!("Message sent to Telegram");
    }
    true
}

pub fn analysis_summary(
    subreddits: &SubredditConfig,
    time_filter: TimeFilter,
    posts_analyzed: usize,
    has_audio: bool,
) -> String {
    let mut message = String::from("🤖 *Reddit AI Analysis Complete*\n\n");
    message.push_str(&format!("📊 *Analyzed:* {} posts\n", posts_analyzed));
    message.push_str(&format!(
        "📁 *Subreddits:* {}\n",
        subreddits.names().join(", ")
    ));
    message.push_str(&format!("⏰ *Time Filter:* {}\n\n", time_filter));
    if has_audio {
        message.push_str("🎙️ *Audio narration included*\n\n");
    }
    message.push_str("📄 *Full analysis file attached below*");
    message
}

/// What [`send_run_results`] delivers.
#[derive(Debug, Clone, Copy)]
pub struct RunDelivery<'a> {
    pub analysis_file: &'a Path,
    pub audio_file: Option<&'a Path>,
    pub subreddits: &'a SubredditConfig,
    pub time_filter: TimeFilter,
    pub posts_analyzed: usize,
}

/// Summary message, analysis document and optional audio. Every part is
/// attempted; the result is true only when all of them went through.
pub async fn send_run_results(notifier: &dyn Notifier, delivery: RunDelivery<'_>) -> bool {
    let summary = analysis_summary(
        delivery.subreddits,
        delivery.time_filter,
        delivery.posts_analyzed,
        delivery.audio_file.is_some(),
    );
    let message_ok = send_formatted(notifier, &summary).await;

    let document_ok = match notifier
        .send_document(delivery.analysis_file, DOCUMENT_CAPTION)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!("Error sending Telegram document: {}", e);
            false
        }
    };

    let audio_ok = match delivery.audio_file {
        Some(audio) => match notifier.send_audio(audio, AUDIO_CAPTION, AUDIO_TITLE).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error sending Telegram audio: {}", e);
                false
            }
        },
        None => true,
    };

    message_ok && document_ok && audio_ok
}

pub fn error_message(error: &str) -> String {
    format!("❌ *Error in Reddit Analysis*\n\n```{}```", error)
}

pub async fn send_error_notification(notifier: &dyn Notifier, error: &str) -> bool {
    send_formatted(notifier, &error_message(error)).await
}
