use crate::format::{format_thread, format_thread_error, raw_data_entry, raw_data_header};
use crate::RedditSource;
use digest_core::{
    CoreError, ErrorExt, RedditApiError, RedditPost, RunConfig, SubredditConfig, TimeFilter,
};
use std::time::Duration;
use tracing::{info, warn};

/// Pause between consecutive comment fetches.
pub const COMMENT_FETCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub time_filter: TimeFilter,
    pub top_comments: u32,
    pub replies_per_comment: u32,
    pub comment_delay: Duration,
}

impl FetchOptions {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            time_filter: config.time_filter,
            top_comments: config.top_comments,
            replies_per_comment: config.replies_per_comment,
            comment_delay: COMMENT_FETCH_DELAY,
        }
    }
}

/// Everything fetched from Reddit for one run.
#[derive(Debug, Clone)]
pub struct RedditCorpus {
    /// Text written to `raw_data.txt` and sent to the model.
    pub raw_data: String,
    pub posts: Vec<RedditPost>,
    /// Subreddits whose listing could not be fetched.
    pub failed_subreddits: Vec<String>,
    /// Posts whose comment thread could not be fetched.
    pub failed_threads: usize,
}

impl RedditCorpus {
    pub fn post_count(&self) -> usize {
        self.posts.len()
    }
}

/// Collect top posts of every configured subreddit, then the comment thread
/// of every post.
///
/// A failing subreddit is skipped and a failing thread is replaced by an
/// error line; only an empty result is an error.
pub async fn fetch_all(
    source: &dyn RedditSource,
    subreddits: &SubredditConfig,
    options: &FetchOptions,
) -> Result<RedditCorpus, CoreError> {
    info!(
        "Fetching posts from {} subreddits ({})",
        subreddits.len(),
        options.time_filter
    );

    let mut posts = Vec::new();
    let mut failed_subreddits = Vec::new();

    for (name, limit) in subreddits.entries() {
        match source.top_posts(name, *limit, options.time_filter).await {
            Ok(found) => {
                info!("Found {} posts from r/{}", found.len(), name);
                posts.extend(found);
            }
            Err(e) => {
                warn!("Skipping r/{}: {}", name, e.user_friendly_message());
                failed_subreddits.push(name.clone());
            }
        }
    }

    if posts.is_empty() {
        return Err(CoreError::RedditApi(RedditApiError::NoPostsFound {
            subreddits: subreddits.len(),
        }));
    }

    info!("Fetching comments from {} posts", posts.len());

    let mut raw_data = raw_data_header();
    let mut failed_threads = 0;
    let total = posts.len();

    for (i, post) in posts.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, total, post.url);

        let thread_text = match source
            .post_thread(post, options.top_comments, options.replies_per_comment)
            .await
        {
            Ok(thread) => format_thread(&thread),
            Err(e) => {
                warn!("Failed to fetch comments for {}: {}", post.url, e);
                failed_threads += 1;
                format_thread_error(&post.url, &e.user_friendly_message())
            }
        };
        raw_data.push_str(&raw_data_entry(&post.url, &thread_text));

        if i + 1 < total && !options.comment_delay.is_zero() {
            tokio::time::sleep(options.comment_delay).await;
        }
    }

    info!(
        "Fetched {} characters of Reddit data from {} posts",
        raw_data.len(),
        total
    );

    Ok(RedditCorpus {
        raw_data,
        posts,
        failed_subreddits,
        failed_threads,
    })
}
