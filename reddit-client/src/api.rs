use crate::rate_limiter::{Budget, RateLimitStatus, RateLimiter};
use digest_core::defaults::{MAX_POSTS_PER_SUBREDDIT, MAX_REPLIES_PER_COMMENT, MAX_TOP_COMMENTS};
use digest_core::{CoreError, RedditApiError, RedditComment, RedditPost, TimeFilter};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://reddit.com";

/// Used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
/// Longest `Retry-After` honored; larger values are capped.
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<C> {
    pub kind: String,
    pub data: RedditListingData<C>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<C> {
    pub children: Vec<C>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

pub type PostListing = RedditListing<RedditListingChild<RedditPostData>>;
pub type CommentListing = RedditListing<CommentThing>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    pub subreddit: String,
    #[serde(default)]
    pub url: Option<String>,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub is_self: bool,
}

/// One entry of a comment listing. `more` stubs stand for collapsed
/// comments and are never expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum CommentThing {
    #[serde(rename = "t1")]
    Comment(RedditCommentData),
    #[serde(rename = "more")]
    More(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub replies: CommentReplies,
}

/// Reddit sends `""` instead of an empty listing when there are no replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommentReplies {
    Listing(Box<CommentListing>),
    Empty(String),
}

impl Default for CommentReplies {
    fn default() -> Self {
        CommentReplies::Empty(String::new())
    }
}

impl CommentReplies {
    fn into_things(self) -> Vec<CommentThing> {
        match self {
            CommentReplies::Listing(listing) => listing.data.children,
            CommentReplies::Empty(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let rate_limiter = Arc::new(RateLimiter::new(Budget::reddit_oauth()));

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
        not_found: RedditApiError,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let waited = self.rate_limiter.acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit budget before {}", waited, endpoint);
        }

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let failure = status_error(status, retry_after(&response), endpoint, not_found);
        if let RedditApiError::RateLimitExceeded { retry_after } = failure {
            self.rate_limiter
                .pause(Duration::from_secs(retry_after))
                .await;
        }
        Err(CoreError::RedditApi(failure))
    }

    /// Top posts of `subreddit` for the given window, at most ten.
    pub async fn get_top_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: u32,
        time_filter: TimeFilter,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let endpoint = format!("/r/{}/top", subreddit);
        let limit = limit.clamp(1, MAX_POSTS_PER_SUBREDDIT).to_string();
        let params = [
            ("t", time_filter.as_str()),
            ("limit", limit.as_str()),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                &params,
                RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                },
            )
            .await?;

        let listing: PostListing = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect();

        info!("Retrieved {} posts from r/{}", posts.len(), subreddit);
        Ok(posts)
    }

    /// Highest scoring top-level comments of a post, each with its highest
    /// scoring direct replies.
    pub async fn get_post_comments(
        &self,
        access_token: &str,
        post_id: &str,
        top_comments: u32,
        replies_per_comment: u32,
    ) -> Result<Vec<RedditComment>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let params = [
            ("sort", "top"),
            ("depth", "2"),
            ("limit", "100"),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                &params,
                RedditApiError::PostNotFound {
                    post_id: post_id.to_string(),
                },
            )
            .await?;

        let (_post, comments): (PostListing, CommentListing) =
            response.json().await.map_err(|e| {
                error!("Failed to parse comments for {}: {}", post_id, e);
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Failed to parse comments for post {}", post_id),
                })
            })?;

        let selected = select_comments(comments.data.children, top_comments, replies_per_comment);
        debug!("Selected {} comments for post {}", selected.len(), post_id);
        Ok(selected)
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status().await
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub(crate) fn status_error(
    status: StatusCode,
    retry_after: Option<u64>,
    endpoint: &str,
    not_found: RedditApiError,
) -> RedditApiError {
    match status.as_u16() {
        429 => {
            let retry_after = retry_after
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                .min(MAX_RETRY_AFTER_SECS);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => not_found,
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    }
}

/// Keep top-level comments and their direct replies, highest score first.
pub fn select_comments(
    things: Vec<CommentThing>,
    top_comments: u32,
    replies_per_comment: u32,
) -> Vec<RedditComment> {
    let top_limit = top_comments.min(MAX_TOP_COMMENTS) as usize;
    let reply_limit = replies_per_comment.min(MAX_REPLIES_PER_COMMENT) as usize;

    let mut comments: Vec<RedditCommentData> = only_comments(things);
    comments.sort_by(|a, b| b.score.cmp(&a.score));
    comments.truncate(top_limit);

    comments
        .into_iter()
        .map(|comment| {
            let mut replies = only_comments(comment.replies.into_things());
            replies.sort_by(|a, b| b.score.cmp(&a.score));
            replies.truncate(reply_limit);

            RedditComment {
                score: comment.score,
                body: comment.body,
                replies: replies
                    .into_iter()
                    .map(|reply| RedditComment {
                        score: reply.score,
                        body: reply.body,
                        replies: Vec::new(),
                    })
                    .collect(),
            }
        })
        .collect()
}

fn only_comments(things: Vec<CommentThing>) -> Vec<RedditCommentData> {
    things
        .into_iter()
        .filter_map(|thing| match thing {
            CommentThing::Comment(data) if !data.body.trim().is_empty() => Some(data),
            _ => None,
        })
        .collect()
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            content: if post_data.selftext.trim().is_empty() {
                None
            } else {
                Some(post_data.selftext)
            },
            subreddit: post_data.subreddit,
            url: format!("{}{}", REDDIT_WEB_BASE, post_data.permalink),
            score: post_data.score,
            num_comments: post_data.num_comments,
            created_utc: post_data.created_utc as i64,
        }
    }
}
