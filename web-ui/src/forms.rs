//! The pipeline form shared by the run and schedule actions.

use background_service::ScheduleState;
use digest_core::{
    EmailOptions, GenerationSettings, RunConfig, SubredditConfig, TimeFilter, TtsOptions,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Every field of the form page. Unchecked checkboxes are simply absent
/// from the submission, so missing fields fall back to `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineForm {
    pub subreddit_config: String,
    pub time_filter: TimeFilter,
    pub top_comments: u32,
    pub replies_per_comment: u32,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub thinking_budget: u32,
    #[serde(deserialize_with = "checkbox")]
    pub send_to_chat: bool,
    #[serde(deserialize_with = "checkbox")]
    pub fetch_emails: bool,
    pub email_address: String,
    #[serde(skip_serializing)]
    pub email_password: String,
    pub allowed_senders: String,
    pub email_hours_back: u32,
    pub max_emails: u32,
    #[serde(deserialize_with = "checkbox")]
    pub generate_tts: bool,
    pub tts_model: String,
    pub voice: String,
    pub tone_instructions: String,
    pub schedule_hour: u32,
    pub schedule_minute: u32,
    pub timezone: String,
}

impl Default for PipelineForm {
    fn default() -> Self {
        Self::from_config(&RunConfig::default(), &ScheduleState::default())
    }
}

fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.is_some_and(|v| !matches!(v.as_str(), "" | "off" | "false")))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl PipelineForm {
    /// Prefill from a run configuration and the schedule fields of `schedule`.
    pub fn from_config(config: &RunConfig, schedule: &ScheduleState) -> Self {
        Self {
            subreddit_config: config.subreddits.to_string(),
            time_filter: config.time_filter,
            top_comments: config.top_comments,
            replies_per_comment: config.replies_per_comment,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            user_prompt: config.user_prompt.clone(),
            max_output_tokens: config.generation.max_output_tokens,
            temperature: config.generation.temperature,
            top_p: config.generation.top_p,
            top_k: config.generation.top_k,
            thinking_budget: config.generation.thinking_budget,
            send_to_chat: config.send_to_chat,
            fetch_emails: config.email.enabled,
            email_address: config.email.address.clone().unwrap_or_default(),
            email_password: String::new(),
            allowed_senders: config.email.allowed_senders.join(", "),
            email_hours_back: config.email.hours_back,
            max_emails: config.email.max_emails,
            generate_tts: config.tts.enabled,
            tts_model: config.tts.model.clone(),
            voice: config.tts.voice.clone(),
            tone_instructions: config.tts.tone_instructions.clone().unwrap_or_default(),
            schedule_hour: schedule.hour,
            schedule_minute: schedule.minute,
            timezone: schedule.timezone.clone(),
        }
    }

    /// Prefill from the saved schedule so the page shows what will run.
    pub fn from_schedule(state: &ScheduleState) -> Self {
        Self::from_config(&state.config, state)
    }

    /// The run configuration described by the form. Range checks happen
    /// where the configuration is used.
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            subreddits: SubredditConfig::parse(&self.subreddit_config),
            time_filter: self.time_filter,
            top_comments: self.top_comments,
            replies_per_comment: self.replies_per_comment,
            model: self.model.trim().to_string(),
            system_prompt: self.system_prompt.replace("\r\n", "\n"),
            user_prompt: self.user_prompt.replace("\r\n", "\n"),
            generation: GenerationSettings {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
                thinking_budget: self.thinking_budget,
            },
            send_to_chat: self.send_to_chat,
            email: EmailOptions {
                enabled: self.fetch_emails,
                address: non_empty(&self.email_address),
                password: non_empty(&self.email_password),
                allowed_senders: EmailOptions::parse_senders(&self.allowed_senders),
                hours_back: self.email_hours_back,
                max_emails: self.max_emails,
            },
            tts: TtsOptions {
                enabled: self.generate_tts,
                model: self.tts_model.trim().to_string(),
                voice: self.voice.trim().to_string(),
                tone_instructions: non_empty(&self.tone_instructions),
            },
        }
    }
}
