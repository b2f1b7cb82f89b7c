pub mod api;
pub mod fetcher;
pub mod format;
pub mod rate_limiter;


use api::RedditApiClient;
use async_trait::async_trait;
use digest_core::{
    ConfigError, CoreError, PostThread, RedditApiError, RedditPost, Settings, TimeFilter,
};
use oauth2::basic::BasicClient;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RequestTokenError, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use fetcher::{fetch_all, FetchOptions, RedditCorpus};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Anything the pipeline can pull posts and threads from.
#[async_trait]
pub trait RedditSource: Send + Sync {
    async fn top_posts(
        &self,
        subreddit: &str,
        limit: u32,
        time_filter: TimeFilter,
    ) -> Result<Vec<RedditPost>, CoreError>;

    async fn post_thread(
        &self,
        post: &RedditPost,
        top_comments: u32,
        replies_per_comment: u32,
    ) -> Result<PostThread, CoreError>;
}

#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl RedditClientConfig {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let (client_id, client_secret) = settings.require_reddit()?;
        Ok(Self::new(
            client_id.to_string(),
            client_secret.to_string(),
            settings.reddit.user_agent.clone(),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + TOKEN_EXPIRY_MARGIN >= self.expires_at
    }
}

/// App-only Reddit client: client-credentials grant plus the OAuth API.
pub struct RedditClient {
    config: RedditClientConfig,
    oauth_client: BasicClient,
    api: RedditApiClient,
    token: Mutex<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| {
            CoreError::Config(ConfigError::InvalidFormat {
                details: format!("Invalid auth URL: {}", e),
            })
        })?;
        let token_url = TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| {
            CoreError::Config(ConfigError::InvalidFormat {
                details: format!("Invalid token URL: {}", e),
            })
        })?;

        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::BasicAuth);

        let api = RedditApiClient::new(config.user_agent.clone())?;

        Ok(Self {
            config,
            oauth_client,
            api,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RedditClientConfig {
        &self.config
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.token.lock().await, Some(token) if !token.is_expired())
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    pub async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    /// Request a fresh application token and cache it.
    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Requesting Reddit application token");
        let user_agent = self.config.user_agent.clone();

        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|request| token_request(user_agent, request))
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => {
                    error!("Token request failed: {}", e);
                    CoreError::Network(e)
                }
                RequestTokenError::ServerResponse(response) => {
                    error!("Reddit rejected the credentials: {:?}", response.error());
                    CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                        reason: response.to_string(),
                    })
                }
                other => {
                    error!("Token exchange failed: {}", other);
                    CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                        reason: other.to_string(),
                    })
                }
            })?;

        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + expires_in,
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        };

        debug!("Reddit token valid for {}s", expires_in.as_secs());
        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        {
            let token = self.token.lock().await;
            if let Some(token) = token.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.access_token.clone());
            }
        }
        Ok(self.authenticate().await?.access_token)
    }

    /// A rejected token is dropped so the next call authenticates again.
    async fn forget_rejected_token<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            warn!("Reddit rejected the cached token, clearing it");
            self.clear_token().await;
        }
        result
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }
}

#[async_trait]
impl RedditSource for RedditClient {
    async fn top_posts(
        &self,
        subreddit: &str,
        limit: u32,
        time_filter: TimeFilter,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let token = self.access_token().await?;
        let result = self
            .api
            .get_top_posts(&token, subreddit, limit, time_filter)
            .await;
        self.forget_rejected_token(result).await
    }

    async fn post_thread(
        &self,
        post: &RedditPost,
        top_comments: u32,
        replies_per_comment: u32,
    ) -> Result<PostThread, CoreError> {
        let token = self.access_token().await?;
        let result = self
            .api
            .get_post_comments(&token, &post.id, top_comments, replies_per_comment)
            .await;
        let comments = self.forget_rejected_token(result).await?;
        Ok(PostThread {
            post: post.clone(),
            comments,
        })
    }
}

/// Token endpoint transport. Reddit throttles requests without a
/// descriptive User-Agent, so the stock oauth2 client is not used.
async fn token_request(
    user_agent: String,
    request: oauth2::HttpRequest,
) -> Result<oauth2::HttpResponse, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(30))
        .build()?;

    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(oauth2::HttpResponse {
        status_code,
        headers,
        body,
    })
}
