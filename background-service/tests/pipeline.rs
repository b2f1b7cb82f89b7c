use async_trait::async_trait;
use background_service::{Adapters, MailConnector, Pipeline};
use digest_core::{
    ConfigError, CoreError, EmailError, EmailMessage, LlmError, NotificationError, PostThread,
    RedditApiError,
    RedditComment, RedditPost, RunConfig, Settings, SubredditConfig, TimeFilter, TtsError,
    TtsOptions,
};
use email_fetcher::{EmailCredentials, EmailQuery, MailSource};
use llm_interface::{GenerationRequest, LlmProvider};
use reddit_client::RedditSource;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telegram_notifier::{Notifier, ParseMode};
use tts_service::SpeechSynthesizer;

const REPORT: &str = "## Topic: Local models keep getting better\n\nKey insights about quantization, \
benchmarks and GPUs that are long enough to count as a real report.";

fn post(id: &str, subreddit: &str) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        title: format!("Post {}", id),
        content: None,
        subreddit: subreddit.to_string(),
        url: format!("https://reddit.com/r/{}/comments/{}/", subreddit, id),
        score: 100,
        num_comments: 1,
        created_utc: 1_700_000_000,
    }
}

struct MockReddit {
    failing: Vec<&'static str>,
    calls: AtomicUsize,
}

impl MockReddit {
    fn new() -> Self {
        Self {
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RedditSource for MockReddit {
    async fn top_posts(
        &self,
        subreddit: &str,
        limit: u32,
        _time_filter: TimeFilter,
    ) -> Result<Vec<RedditPost>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&subreddit) {
            return Err(RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            }
            .into());
        }
        Ok((0..limit)
            .map(|i| post(&format!("{}{}", subreddit, i), subreddit))
            .collect())
    }

    async fn post_thread(
        &self,
        post: &RedditPost,
        _top_comments: u32,
        _replies_per_comment: u32,
    ) -> Result<PostThread, CoreError> {
        Ok(PostThread {
            post: post.clone(),
            comments: vec![RedditComment {
                score: 42,
                body: "Insightful comment".to_string(),
                replies: Vec::new(),
            }],
        })
    }
}

struct MockLlm {
    response: String,
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockLlm {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CoreError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

struct MockMail {
    result: Result<Vec<EmailMessage>, ()>,
    connected_as: Mutex<Option<String>>,
}

struct MockMailbox {
    result: Result<Vec<EmailMessage>, ()>,
}

#[async_trait]
impl MailSource for MockMailbox {
    async fn fetch(&self, _query: &EmailQuery) -> Result<Vec<EmailMessage>, CoreError> {
        self.result.clone().map_err(|_| {
            EmailError::LoginFailed {
                address: "me@example.com".to_string(),
                reason: "bad password".to_string(),
            }
            .into()
        })
    }
}

impl MailConnector for MockMail {
    fn connect(&self, credentials: EmailCredentials) -> Arc<dyn MailSource> {
        *self.connected_as.lock().unwrap() = Some(credentials.address.clone());
        Arc::new(MockMailbox {
            result: self.result.clone(),
        })
    }
}

struct MockTts {
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(&self, _text: &str, _options: &TtsOptions) -> Result<Vec<u8>, CoreError> {
        if self.fail {
            return Err(TtsError::NoAudio.into());
        }
        Ok(vec![0, 0, 16, 0, 240, 255])
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Message(String),
    Document(PathBuf),
    Audio(PathBuf),
}

/// Records every call; with `fail` set each call is rejected after recording.
#[derive(Default)]
struct MockNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: AtomicBool,
}

impl MockNotifier {
    fn record(&self, method: &str, sent: Sent) -> Result<(), CoreError> {
        self.sent.lock().unwrap().push(sent);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Rejected {
                method: method.to_string(),
                description: "Forbidden: bot was blocked by the user".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_message(
        &self,
        text: &str,
        _parse_mode: Option<ParseMode>,
    ) -> Result<(), CoreError> {
        self.record("sendMessage", Sent::Message(text.to_string()))
    }

    async fn send_document(&self, path: &Path, _caption: &str) -> Result<(), CoreError> {
        self.record("sendDocument", Sent::Document(path.to_path_buf()))
    }

    async fn send_audio(&self, path: &Path, _caption: &str, _title: &str) -> Result<(), CoreError> {
        self.record("sendAudio", Sent::Audio(path.to_path_buf()))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    output_dir: PathBuf,
    reddit: Arc<MockReddit>,
    llm: Arc<MockLlm>,
    mail: Arc<MockMail>,
    notifier: Arc<MockNotifier>,
    pipeline: Arc<Pipeline>,
}

fn settings(output_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.reddit.client_id = Some("id".to_string());
    settings.reddit.client_secret = Some("secret".to_string());
    settings.llm.google_api_key = Some("google".to_string());
    settings.telegram.bot_token = Some("token".to_string());
    settings.telegram.chat_id = Some("42".to_string());
    settings.email.address = Some("env@example.com".to_string());
    settings.email.password = Some("env-pass".to_string());
    settings.output_dir = output_dir.to_path_buf();
    settings
}

fn harness_with(
    settings_fn: impl FnOnce(&mut Settings),
    reddit: MockReddit,
    llm: MockLlm,
    mail: Result<Vec<EmailMessage>, ()>,
    tts_fails: bool,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("outputs");
    let mut settings = settings(&output_dir);
    settings_fn(&mut settings);

    let reddit = Arc::new(reddit);
    let llm = Arc::new(llm);
    let mail = Arc::new(MockMail {
        result: mail,
        connected_as: Mutex::new(None),
    });
    let notifier = Arc::new(MockNotifier::default());

    let adapters = Adapters {
        reddit: Some(reddit.clone()),
        llm: llm.clone(),
        mail: mail.clone(),
        tts: Some(Arc::new(MockTts { fail: tts_fails })),
        notifier: Some(notifier.clone()),
    };
    let pipeline = Pipeline::new(settings, adapters).with_comment_delay(Duration::ZERO);

    Harness {
        _dir: dir,
        output_dir,
        reddit,
        llm,
        mail,
        notifier,
        pipeline: Arc::new(pipeline),
    }
}

fn harness() -> Harness {
    harness_with(|_| {}, MockReddit::new(), MockLlm::new(REPORT), Ok(Vec::new()), false)
}

fn config() -> RunConfig {
    RunConfig {
        subreddits: SubredditConfig::parse("LocalLLaMA:2, OpenAI:1"),
        ..RunConfig::default()
    }
}

fn newsletter() -> EmailMessage {
    EmailMessage {
        subject: "The Batch".to_string(),
        sender: "thebatch@deeplearning.ai".to_string(),
        date: "Tue, 15 Oct 2024 09:00:00 +0000".to_string(),
        body: "A new open-weights model was released.".to_string(),
    }
}

fn run_folders(output_dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(output_dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_basic_run_writes_run_folder() {
    let h = harness();
    let outcome = h.pipeline.run(&config()).await.unwrap();

    assert_eq!(outcome.posts_analyzed, 3);
    assert_eq!(outcome.analysis, REPORT);
    assert!(outcome.run_folder.starts_with(&h.output_dir));
    assert!(outcome
        .run_folder
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("run_"));
    assert_eq!(outcome.email_file, None);
    assert_eq!(outcome.audio_file, None);

    let analysis = std::fs::read_to_string(&outcome.analysis_file).unwrap();
    assert!(analysis.starts_with("🧠 AI ANALYSIS REPORT\n\n"));
    assert!(analysis.contains("Model: gemini-2.5-pro\n"));
    assert!(analysis.contains("Posts Analyzed: 3\n"));
    assert!(analysis.contains("Subreddits: LocalLLaMA, OpenAI\n\n---\n\n"));
    assert!(analysis.ends_with(REPORT));

    let raw = std::fs::read_to_string(&outcome.raw_data_file).unwrap();
    assert!(raw.contains("POST: Post LocalLLaMA0"));
    assert!(raw.contains("POST: Post OpenAI0"));
    assert!(raw.contains("Insightful comment"));

    let llm_input = std::fs::read_to_string(&outcome.llm_input_file).unwrap();
    assert!(llm_input.contains("Has Email Data: No\n"));
    assert!(llm_input.contains(&format!("FINAL COMBINED CONTENT:\n\n{}", raw)));

    // Nothing goes to the chat unless asked
    assert!(h.notifier.sent.lock().unwrap().is_empty());

    let requests = h.llm.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains(&raw));
}

#[tokio::test]
async fn test_full_run_with_email_audio_and_chat() {
    let h = harness_with(
        |_| {},
        MockReddit::new(),
        MockLlm::new(REPORT),
        Ok(vec![newsletter()]),
        false,
    );
    let mut config = config();
    config.send_to_chat = true;
    config.email.enabled = true;
    config.email.address = Some("form@example.com".to_string());
    config.email.password = Some("form-pass".to_string());
    config.tts = TtsOptions {
        enabled: true,
        ..TtsOptions::default()
    };

    let outcome = h.pipeline.run(&config).await.unwrap();

    assert_eq!(
        h.mail.connected_as.lock().unwrap().as_deref(),
        Some("form@example.com")
    );

    let email_file = outcome.email_file.clone().unwrap();
    let emails: Vec<EmailMessage> =
        serde_json::from_str(&std::fs::read_to_string(email_file).unwrap()).unwrap();
    assert_eq!(emails, vec![newsletter()]);

    let llm_input = std::fs::read_to_string(&outcome.llm_input_file).unwrap();
    assert!(llm_input.contains("Has Email Data: Yes\n"));
    assert!(llm_input.contains("EMAIL DATA:\n\n# AI NEWS EMAILS (1 total)"));

    let requests = h.llm.requests.lock().unwrap();
    assert!(requests[0].prompt.contains("\n\n---\n\n# AI NEWS EMAILS (1 total)"));

    let audio = outcome.audio_file.clone().unwrap();
    assert_eq!(audio, outcome.run_folder.join("audio.wav"));
    assert!(audio.exists());

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    assert!(matches!(&sent[0], Sent::Message(text) if text.contains("Analyzed:* 3 posts")));
    assert_eq!(sent[1], Sent::Document(outcome.analysis_file.clone()));
    assert_eq!(sent[2], Sent::Audio(audio));
}

#[tokio::test]
async fn test_optional_step_failures_do_not_abort() {
    let h = harness_with(|_| {}, MockReddit::new(), MockLlm::new(REPORT), Err(()), true);
    let mut config = config();
    config.email.enabled = true;
    config.tts.enabled = true;

    let outcome = h.pipeline.run(&config).await.unwrap();

    assert_eq!(outcome.email_file, None);
    assert_eq!(outcome.audio_file, None);
    assert!(!outcome.run_folder.join("audio.wav").exists());
    assert!(outcome.analysis_file.exists());
}

#[tokio::test]
async fn test_failed_chat_delivery_does_not_abort() {
    let h = harness();
    h.notifier.fail.store(true, Ordering::SeqCst);
    let mut config = config();
    config.send_to_chat = true;
    config.tts.enabled = true;

    let outcome = h.pipeline.run(&config).await.unwrap();

    assert_eq!(outcome.posts_analyzed, 3);
    assert_eq!(outcome.analysis, REPORT);
    assert!(outcome.analysis_file.exists());
    assert!(outcome.raw_data_file.exists());
    assert!(outcome.llm_input_file.exists());
    assert!(outcome.audio_file.as_ref().unwrap().exists());
    assert_eq!(run_folders(&h.output_dir).len(), 1);

    // Delivery was attempted and every call was rejected
    let sent = h.notifier.sent.lock().unwrap();
    assert!(matches!(&sent[0], Sent::Message(_)));
    assert!(sent.contains(&Sent::Document(outcome.analysis_file.clone())));
    assert!(matches!(sent.last(), Some(Sent::Audio(_))));
}

#[tokio::test]
async fn test_short_analysis_fails_and_notifies() {
    let h = harness_with(
        |_| {},
        MockReddit::new(),
        MockLlm::new("Too short."),
        Ok(Vec::new()),
        false,
    );
    let mut config = config();
    config.send_to_chat = true;

    let err = h.pipeline.run(&config).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Llm(LlmError::AnalysisTooShort { length: 10, .. })
    ));

    assert!(run_folders(&h.output_dir).is_empty());

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Sent::Message(text) => {
            assert!(text.starts_with("❌ *Error in Reddit Analysis*\n\n```Error during workflow:"))
        }
        other => panic!("Expected error message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credentials_fail_before_fetching() {
    let h = harness_with(
        |s| {
            s.reddit.client_secret = None;
            s.telegram.chat_id = None;
        },
        MockReddit::new(),
        MockLlm::new(REPORT),
        Ok(Vec::new()),
        false,
    );
    let mut config = config();
    config.send_to_chat = true;

    match h.pipeline.run(&config).await {
        Err(CoreError::Config(ConfigError::MissingEnvironmentVariable { var_name })) => {
            assert_eq!(var_name, "REDDIT_CLIENT_SECRET, TELEGRAM_CHAT_ID");
        }
        other => panic!("Expected missing variables, got {:?}", other.map(|o| o.run_folder)),
    }
    assert_eq!(h.reddit.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_subreddits_failing_is_fatal() {
    let reddit = MockReddit {
        failing: vec!["LocalLLaMA", "OpenAI"],
        calls: AtomicUsize::new(0),
    };
    let h = harness_with(|_| {}, reddit, MockLlm::new(REPORT), Ok(Vec::new()), false);

    let err = h.pipeline.run(&config()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::NoPostsFound { subreddits: 2 })
    ));
    assert!(h.llm.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let h = harness();
    let config = RunConfig {
        replies_per_comment: 9,
        ..config()
    };

    match h.pipeline.run(&config).await {
        Err(CoreError::Config(ConfigError::InvalidValue { field, .. })) => {
            assert_eq!(field, "replies_per_comment")
        }
        other => panic!("Expected invalid value, got {:?}", other.map(|o| o.run_folder)),
    }
}

#[tokio::test]
async fn test_runs_do_not_overlap() {
    let mut llm = MockLlm::new(REPORT);
    llm.delay = Duration::from_millis(50);
    let h = harness_with(|_| {}, MockReddit::new(), llm, Ok(Vec::new()), false);

    let first = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.run(&config()).await })
    };
    let second = {
        let pipeline = h.pipeline.clone();
        tokio::spawn(async move { pipeline.run(&config()).await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(h.llm.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(h.llm.requests.lock().unwrap().len(), 2);
    assert_ne!(first.run_folder, second.run_folder);
    assert!(!h.pipeline.is_running());
}
