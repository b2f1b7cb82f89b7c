//! Per-run output folder and the files written into it.

use chrono::{DateTime, Local};
use digest_core::{CoreError, EmailMessage, SubredditConfig, TimeFilter};
use email_fetcher::group_thousands;
use std::fmt::Write;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ANALYSIS_FILE: &str = "analysis.txt";
pub const RAW_DATA_FILE: &str = "raw_data.txt";
pub const LLM_INPUT_FILE: &str = "llm_input.txt";
pub const EMAILS_FILE: &str = "emails.json";
pub const AUDIO_FILE: &str = "audio.wav";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Folder name for a run started at `started`.
pub fn run_folder_name(started: DateTime<Local>) -> String {
    format!("run_{}", started.format("%Y-%m-%d_%H-%M-%S"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunFolder {
    path: PathBuf,
}

impl RunFolder {
    /// Create `output_dir/run_<timestamp>`. When two runs start within the
    /// same second the later one gets `_2`, `_3`, ... appended.
    pub async fn create(output_dir: &Path, started: DateTime<Local>) -> Result<Self, CoreError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let base = run_folder_name(started);
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            let path = output_dir.join(name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    info!("Run folder: {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    async fn write(&self, name: &str, contents: &str) -> Result<PathBuf, CoreError> {
        let path = self.file(name);
        tokio::fs::write(&path, contents).await?;
        info!("Saved {}", path.display());
        Ok(path)
    }

    pub async fn write_analysis(
        &self,
        header: &ReportHeader<'_>,
        analysis: &str,
    ) -> Result<PathBuf, CoreError> {
        self.write(ANALYSIS_FILE, &render_analysis(header, analysis))
            .await
    }

    pub async fn write_raw_data(&self, raw_data: &str) -> Result<PathBuf, CoreError> {
        self.write(RAW_DATA_FILE, raw_data).await
    }

    pub async fn write_llm_input(&self, input: &LlmInput<'_>) -> Result<PathBuf, CoreError> {
        self.write(LLM_INPUT_FILE, &render_llm_input(input)).await
    }

    pub async fn write_emails(&self, emails: &[EmailMessage]) -> Result<PathBuf, CoreError> {
        let json = serde_json::to_string_pretty(emails)?;
        self.write(EMAILS_FILE, &json).await
    }
}

/// Metadata at the top of `analysis.txt`.
#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub generated: DateTime<Local>,
    pub time_filter: TimeFilter,
    pub model: &'a str,
    pub posts_analyzed: usize,
    pub subreddits: &'a SubredditConfig,
}

pub fn render_analysis(header: &ReportHeader<'_>, analysis: &str) -> String {
    let mut out = String::from("🧠 AI ANALYSIS REPORT\n\n");
    let _ = writeln!(out, "Generated: {}", header.generated.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "Time Filter: {}", header.time_filter);
    let _ = writeln!(out, "Model: {}", header.model);
    let _ = writeln!(out, "Posts Analyzed: {}", header.posts_analyzed);
    let _ = writeln!(out, "Subreddits: {}\n", header.subreddits.names().join(", "));
    out.push_str("---\n\n");
    out.push_str(analysis);
    out
}

/// The exact payload sent to the model, kept for auditing a run.
#[derive(Debug, Clone)]
pub struct LlmInput<'a> {
    pub generated: DateTime<Local>,
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub reddit_data: &'a str,
    pub email_data: Option<&'a str>,
    pub combined: &'a str,
}

pub fn render_llm_input(input: &LlmInput<'_>) -> String {
    let chars = |s: &str| group_thousands(s.chars().count());
    let email_data = input.email_data.filter(|e| !e.is_empty());

    let mut out = String::from("LLM INPUT - EXACT PAYLOAD FOR ANALYSIS\n\n");
    let _ = writeln!(out, "Generated: {}", input.generated.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "Model: {}", input.model);
    let _ = writeln!(out, "Reddit Data Length: {} characters", chars(input.reddit_data));
    let _ = writeln!(
        out,
        "Email Data Length: {} characters",
        chars(email_data.unwrap_or(""))
    );
    let _ = writeln!(out, "Combined Length: {} characters", chars(input.combined));
    let _ = writeln!(
        out,
        "Has Email Data: {}\n",
        if email_data.is_some() { "Yes" } else { "No" }
    );
    out.push_str("---\n\n");

    let _ = write!(out, "SYSTEM PROMPT:\n\n{}\n\n---\n\n", input.system_prompt);
    let _ = write!(out, "USER PROMPT:\n\n{}\n\n---\n\n", input.user_prompt);
    let _ = write!(out, "REDDIT DATA:\n\n{}\n\n", input.reddit_data);
    if let Some(email) = email_data {
        let _ = write!(out, "---\n\nEMAIL DATA:\n\n{}\n\n", email);
    }
    let _ = write!(out, "---\n\nFINAL COMBINED CONTENT:\n\n{}", input.combined);
    out
}

/// Reddit data followed by the email digest, when there is one.
pub fn combine_corpus(reddit_data: &str, email_content: Option<&str>) -> String {
    match email_content.filter(|e| !e.is_empty()) {
        Some(email) => format!("{}\n\n---\n\n{}", reddit_data, email),
        None => reddit_data.to_string(),
    }
}
