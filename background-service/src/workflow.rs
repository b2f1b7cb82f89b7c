//! One complete analysis run: Reddit, optional email, model, files, optional
//! audio and optional chat delivery.

use crate::output::{combine_corpus, LlmInput, ReportHeader, RunFolder, AUDIO_FILE};
use chrono::Local;
use digest_core::{
    ConfigError, CoreError, EmailMessage, ErrorExt, RunConfig, RunOutcome, Settings,
};
use email_fetcher::{
    format_for_analysis, EmailCredentials, EmailQuery, ImapFetcher, MailSource,
    ANALYSIS_BODY_LIMIT,
};
use llm_interface::{ensure_substantial, GenerationRequest, LlmProvider, ModelRouter};
use reddit_client::{fetch_all, FetchOptions, RedditClient, RedditClientConfig, RedditSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telegram_notifier::{
    send_error_notification, send_run_results, Notifier, RunDelivery, TelegramNotifier,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tts_service::{narrate_to_file, GeminiTts, SpeechSynthesizer};

/// Opens a mailbox for one run. Credentials may differ per run.
pub trait MailConnector: Send + Sync {
    fn connect(&self, credentials: EmailCredentials) -> Arc<dyn MailSource>;
}

pub struct ImapConnector;

impl MailConnector for ImapConnector {
    fn connect(&self, credentials: EmailCredentials) -> Arc<dyn MailSource> {
        Arc::new(ImapFetcher::new(credentials))
    }
}

/// External services a run talks to. Services without credentials are
/// absent and the run decides whether that is fatal.
#[derive(Clone)]
pub struct Adapters {
    pub reddit: Option<Arc<dyn RedditSource>>,
    pub llm: Arc<dyn LlmProvider>,
    pub mail: Arc<dyn MailConnector>,
    pub tts: Option<Arc<dyn SpeechSynthesizer>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Adapters {
    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        let reddit: Option<Arc<dyn RedditSource>> =
            match RedditClientConfig::from_settings(settings) {
                Ok(config) => Some(Arc::new(RedditClient::new(config)?)),
                Err(e) => {
                    warn!("Reddit client unavailable: {}", e);
                    None
                }
            };

        let tts: Option<Arc<dyn SpeechSynthesizer>> = match &settings.llm.google_api_key {
            Some(key) => Some(Arc::new(GeminiTts::new(key.clone())?)),
            None => None,
        };

        let notifier: Option<Arc<dyn Notifier>> = match settings.require_telegram() {
            Ok(_) => Some(Arc::new(TelegramNotifier::from_settings(settings)?)),
            Err(_) => None,
        };

        Ok(Self {
            reddit,
            llm: Arc::new(ModelRouter::from_settings(&settings.llm)?),
            mail: Arc::new(ImapConnector),
            tts,
            notifier,
        })
    }
}

pub struct Pipeline {
    settings: Settings,
    adapters: Adapters,
    comment_delay: Duration,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(settings: Settings, adapters: Adapters) -> Self {
        Self {
            settings,
            adapters,
            comment_delay: reddit_client::fetcher::COMMENT_FETCH_DELAY,
            run_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: Settings) -> Result<Self, CoreError> {
        let adapters = Adapters::from_settings(&settings)?;
        Ok(Self::new(settings, adapters))
    }

    pub fn with_comment_delay(mut self, delay: Duration) -> Self {
        self.comment_delay = delay;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Execute one run. Runs never overlap; a second caller waits for the
    /// first to finish. With chat delivery on, a failure is also reported
    /// to the chat.
    pub async fn run(&self, config: &RunConfig) -> Result<RunOutcome, CoreError> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Another run is in progress, waiting for it to finish");
                self.run_lock.lock().await
            }
        };

        info!("REDDIT AI ANALYZER - WORKFLOW START");
        let result = self.execute(config).await;

        match &result {
            Ok(outcome) => info!("Workflow complete, files in {}", outcome.run_folder.display()),
            Err(e) => {
                e.log_error();
                if config.send_to_chat {
                    self.notify_failure(e).await;
                }
            }
        }
        result
    }

    async fn notify_failure(&self, e: &CoreError) {
        let Some(notifier) = &self.adapters.notifier else {
            warn!("Cannot report failure: chat delivery not configured");
            return;
        };
        let message = format!("Error during workflow: {}", e.user_friendly_message());
        if !send_error_notification(notifier.as_ref(), &message).await {
            error!("Failed to send error notification");
        }
    }

    fn check_credentials(&self, config: &RunConfig) -> Result<(), ConfigError> {
        let missing = self
            .settings
            .missing_for_run(&config.model, config.send_to_chat);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingEnvironmentVariable {
                var_name: missing.join(", "),
            })
        }
    }

    async fn execute(&self, config: &RunConfig) -> Result<RunOutcome, CoreError> {
        config.validate()?;
        self.check_credentials(config)?;
        info!(
            "Subreddits: {} | Time filter: {}",
            config.subreddits, config.time_filter
        );

        let reddit = self.adapters.reddit.as_ref().ok_or_else(|| {
            ConfigError::MissingEnvironmentVariable {
                var_name: "REDDIT_CLIENT_ID".to_string(),
            }
        })?;
        let options = FetchOptions {
            comment_delay: self.comment_delay,
            ..FetchOptions::from_run_config(config)
        };
        let corpus = fetch_all(reddit.as_ref(), &config.subreddits, &options).await?;
        info!("Fetched {} characters of Reddit data", corpus.raw_data.len());

        let emails = if config.email.enabled {
            self.fetch_emails(config).await
        } else {
            Vec::new()
        };
        let email_content = if emails.is_empty() {
            None
        } else {
            Some(format_for_analysis(&emails, Some(ANALYSIS_BODY_LIMIT)))
        };
        if let Some(content) = &email_content {
            info!("Including {} characters of email content", content.len());
        }

        let combined = combine_corpus(&corpus.raw_data, email_content.as_deref());
        let request = GenerationRequest::new(
            &config.model,
            &config.system_prompt,
            &config.user_prompt,
            &combined,
            &config.generation,
        );
        let analysis = self.adapters.llm.generate(&request).await?;
        ensure_substantial(&analysis)?;

        let generated = Local::now();
        let folder = RunFolder::create(&self.settings.output_dir, generated).await?;
        let header = ReportHeader {
            generated,
            time_filter: config.time_filter,
            model: &config.model,
            posts_analyzed: corpus.post_count(),
            subreddits: &config.subreddits,
        };
        let analysis_file = folder.write_analysis(&header, &analysis).await?;
        let raw_data_file = folder.write_raw_data(&corpus.raw_data).await?;
        let llm_input_file = folder
            .write_llm_input(&LlmInput {
                generated,
                model: &config.model,
                system_prompt: &config.system_prompt,
                user_prompt: &config.user_prompt,
                reddit_data: &corpus.raw_data,
                email_data: email_content.as_deref(),
                combined: &combined,
            })
            .await?;
        let email_file = if emails.is_empty() {
            None
        } else {
            Some(folder.write_emails(&emails).await?)
        };

        let audio_file = if config.tts.enabled {
            self.narrate(config, &analysis, &folder).await
        } else {
            None
        };

        if config.send_to_chat {
            self.deliver(config, &analysis_file, audio_file.as_deref(), corpus.post_count())
                .await;
        }

        Ok(RunOutcome {
            run_folder: folder.path().to_path_buf(),
            analysis_file,
            raw_data_file,
            llm_input_file,
            email_file,
            audio_file,
            posts_analyzed: corpus.post_count(),
            analysis,
        })
    }

    /// Optional step: failures are logged and yield no emails.
    async fn fetch_emails(&self, config: &RunConfig) -> Vec<EmailMessage> {
        if config.email.allowed_senders.is_empty() {
            warn!("Email fetching enabled but no allowed senders configured");
            return Vec::new();
        }
        let credentials = match EmailCredentials::resolve(&self.settings.email, &config.email) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Skipping emails: {}", e);
                return Vec::new();
            }
        };

        info!("Fetching emails from {} senders", config.email.allowed_senders.len());
        let source = self.adapters.mail.connect(credentials);
        match source.fetch(&EmailQuery::from(&config.email)).await {
            Ok(emails) if emails.is_empty() => {
                warn!("No emails found");
                emails
            }
            Ok(emails) => {
                info!("Fetched {} email(s)", emails.len());
                emails
            }
            Err(e) => {
                warn!("Email fetch failed: {}", e.user_friendly_message());
                Vec::new()
            }
        }
    }

    /// Optional step: failures are logged and yield no audio.
    async fn narrate(
        &self,
        config: &RunConfig,
        analysis: &str,
        folder: &RunFolder,
    ) -> Option<PathBuf> {
        let Some(tts) = &self.adapters.tts else {
            warn!("Audio requested but GOOGLE_API_KEY is not configured");
            return None;
        };

        let path = folder.file(AUDIO_FILE);
        match narrate_to_file(tts.as_ref(), analysis, &config.tts, &path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to generate audio: {}", e.user_friendly_message());
                None
            }
        }
    }

    /// Optional step: failures are logged only.
    async fn deliver(
        &self,
        config: &RunConfig,
        analysis_file: &Path,
        audio_file: Option<&Path>,
        posts_analyzed: usize,
    ) {
        let Some(notifier) = &self.adapters.notifier else {
            warn!("Chat delivery requested but not configured");
            return;
        };

        info!("Sending results to Telegram");
        let delivery = RunDelivery {
            analysis_file,
            audio_file,
            subreddits: &config.subreddits,
            time_filter: config.time_filter,
            posts_analyzed,
        };
        if send_run_results(notifier.as_ref(), delivery).await {
            info!("Results sent to Telegram");
        } else {
            warn!("Failed to send some results to Telegram");
        }
    }
}
