//! Fetch top posts and threads for a few subreddits and print the raw corpus.
//!
//! Reads REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET from the environment or
//! a `.env` file:
//!
//! ```text
//! cargo run -p reddit-client --example fetch_top -- "LocalLLaMA:2, rust:1" week
//! ```

use digest_core::{ErrorExt, Settings, SubredditConfig, TimeFilter};
use reddit_client::{fetch_all, FetchOptions, RedditClient, RedditClientConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let subreddits = SubredditConfig::parse(&args.next().unwrap_or_else(|| "LocalLLaMA:2".into()));
    let time_filter: TimeFilter = args.next().unwrap_or_else(|| "day".into()).parse()?;

    let settings = Settings::load(None)?;
    let client = RedditClient::new(RedditClientConfig::from_settings(&settings)?)?;

    let token = client.authenticate().await?;
    println!("Authenticated, scopes: {:?}", token.scope);

    let options = FetchOptions {
        time_filter,
        top_comments: 5,
        replies_per_comment: 2,
        comment_delay: Duration::from_secs(1),
    };

    match fetch_all(&client, &subreddits, &options).await {
        Ok(corpus) => {
            println!("{}", corpus.raw_data);
            println!(
                "{} posts, {} failed subreddits, {} failed threads",
                corpus.post_count(),
                corpus.failed_subreddits.len(),
                corpus.failed_threads
            );
            let status = client.api().rate_limit_status().await;
            println!("Rate limit tokens left: {}/{}", status.available, status.burst);
        }
        Err(e) => {
            e.log_error();
            println!("Fetch failed: {}", e.user_friendly_message());
        }
    }

    Ok(())
}
