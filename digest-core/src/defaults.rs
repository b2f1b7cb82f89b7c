//! Default values shared by the web form, the scheduler and the CLI.

pub const DEFAULT_SUBREDDITS: &[(&str, u32)] = &[
    ("LocalLLaMA", 10),
    ("artificial", 5),
    ("MachineLearning", 2),
    ("OpenAI", 2),
    ("AI_Agents", 2),
    ("ArtificialInteligence", 5),
];

pub const DEFAULT_TOP_COMMENTS: u32 = 10;
pub const DEFAULT_REPLIES_PER_COMMENT: u32 = 5;
pub const MAX_TOP_COMMENTS: u32 = 10;
pub const MAX_REPLIES_PER_COMMENT: u32 = 5;
pub const MAX_POSTS_PER_SUBREDDIT: u32 = 10;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Models offered in the UI together with their output-token ceiling.
pub const MODEL_MAX_TOKENS: &[(&str, u32)] = &[
    ("gemini-2.5-pro", 65535),
    ("gemini-2.5-flash", 8192),
    ("openai:gpt-4o", 16384),
    ("openai:gpt-4o-mini", 16384),
    ("openai:gpt-5", 32768),
];
pub const FALLBACK_MAX_TOKENS: u32 = 8192;

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 65535;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_TOP_K: u32 = 64;
pub const DEFAULT_THINKING_BUDGET: u32 = 8192;
pub const MAX_THINKING_BUDGET: u32 = 32768;

pub const DEFAULT_EMAIL_HOURS_BACK: u32 = 24;
pub const MAX_EMAIL_HOURS_BACK: u32 = 8760;
pub const DEFAULT_MAX_EMAILS: u32 = 20;
pub const MAX_EMAILS: u32 = 200;
pub const DEFAULT_ALLOWED_SENDERS: &[&str] = &[
    "thebatch@deeplearning.ai",
    "newsletter@openai.com",
    "news@anthropic.com",
];

pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const TTS_MODELS: &[&str] = &["gemini-2.5-flash-preview-tts", "gemini-2.5-pro-preview-tts"];
pub const DEFAULT_VOICE: &str = "Sadaltager";
pub const DEFAULT_TONE_INSTRUCTIONS: &str = "Speak in engaging and excited tone";

pub const DEFAULT_SCHEDULE_HOUR: u32 = 7;
pub const DEFAULT_SCHEDULE_MINUTE: u32 = 0;
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert AI research analyst, tasked with filtering and summarizing Reddit discussions and email news for an AI Engineer. Your goal is to deliver a concise, insightful, and well-structured detailed report.

Your Analysis Must Focus On:

- New AI Models: Announcements, capabilities, and comparisons of new models.
- Performance Benchmarks: Discussions about model performance, hardware (GPUs, NPUs), and software.
- Project Ideas: Novel applications, open-source projects, and new tools.
- Novel AI Techniques: New methods and ideas such as cache-to-cache communication, schema-based prompting, or efficient fine-tuning.

Required Output Structure:

For each relevant Reddit post, create a distinct section with the following format. Present the most interesting topics first.

1. Topic: Create a short, descriptive title for the main discussion in the post.

2. Key Insights:
   - Distill the most important takeaways, trends, or conflicting opinions from the post and comments into 3-5 clear, concise bullet points.
   - If there are strong conflicting opinions, present them here as a "Point/Counterpoint."

3. Most Insightful Comment:
   - Quote the single most insightful or valuable comment that best enriches an AI Engineer's knowledge.

4. Source:
   - Provide the direct URL to the information.

Tone and Style Guidelines:

- Be Concise: Use clear, direct language. Avoid filler words and long, complex sentences. The final output should be a dense summary of valuable information.
- Objective Analysis: Summarize the findings and opinions from the text without adding your own external opinions.
"#;

pub const DEFAULT_USER_PROMPT: &str = "Analyze the following data and generate your report.";

/// Ceiling on output tokens for a model name, falling back to a conservative
/// limit for models outside the known table.
pub fn model_max_tokens(model: &str) -> u32 {
    MODEL_MAX_TOKENS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, max)| *max)
        .unwrap_or(FALLBACK_MAX_TOKENS)
}
