use anyhow::{anyhow, Context, Result};
use background_service::{BackgroundService, Pipeline, ScheduleStore};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use digest_core::{ErrorExt, RunConfig, Settings, SubredditConfig, TimeFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use web_ui::AppState;

const DEFAULT_LOG_FILTER: &str = "reddit_digest=info,digest_core=info,reddit_client=info,\
llm_interface=info,email_fetcher=info,tts_service=info,telegram_notifier=info,\
background_service=info,web_ui=info";

#[derive(Debug, Parser)]
#[command(
    name = "reddit-digest",
    version,
    about = "Daily AI digest of top Reddit discussions and email newsletters"
)]
struct Cli {
    /// TOML settings file. Environment variables take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the web UI together with the daily scheduler
    Serve {
        /// Listen address, e.g. 127.0.0.1:7860
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the pipeline once and exit
    Run(RunArgs),
    /// Inspect the daily schedule
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ScheduleCommand {
    /// Show the saved schedule, its next run and the last scheduled result
    Status,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Start from the saved schedule configuration instead of the defaults
    #[arg(long)]
    saved: bool,

    /// Subreddits as `Name:Posts, Name2:Posts`
    #[arg(long)]
    subreddits: Option<String>,

    /// hour, day, week, month, year or all
    #[arg(long)]
    time_filter: Option<TimeFilter>,

    #[arg(long)]
    model: Option<String>,

    /// Deliver the report to the Telegram chat
    #[arg(long)]
    send_to_chat: bool,

    /// Include newsletters from the configured mailbox
    #[arg(long)]
    emails: bool,

    /// Narrate the report to audio.wav
    #[arg(long)]
    audio: bool,
}

impl RunArgs {
    fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(subreddits) = &self.subreddits {
            config.subreddits = SubredditConfig::parse(subreddits);
        }
        if let Some(time_filter) = self.time_filter {
            config.time_filter = time_filter;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        config.send_to_chat |= self.send_to_chat;
        config.email.enabled |= self.emails;
        config.tts.enabled |= self.audio;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Serve { bind } => serve(settings, bind).await,
        Command::Run(args) => run_once(settings, args).await,
        Command::Schedule {
            command: ScheduleCommand::Status,
        } => schedule_status(settings).await,
    }
}

async fn serve(settings: Settings, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| settings.bind_address.clone());
    let store = ScheduleStore::new(&settings.schedule_file);

    let pipeline = Arc::new(Pipeline::from_settings(settings)?);
    let scheduler = Arc::new(BackgroundService::new(pipeline.clone(), store).await);
    scheduler.start().await;

    let state = AppState::new(pipeline, scheduler.clone())?;
    let app = web_ui::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("Web UI listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.stop().await;
    info!("Shut down");
    Ok(())
}

async fn run_once(settings: Settings, args: RunArgs) -> Result<()> {
    let base = if args.saved {
        ScheduleStore::new(&settings.schedule_file).load().await?.config
    } else {
        RunConfig::default()
    };
    let config = args.apply(base);

    let pipeline = Pipeline::from_settings(settings)?;
    let outcome = pipeline
        .run(&config)
        .await
        .map_err(|e| anyhow!(e.user_friendly_message()))?;

    println!("Analyzed {} posts", outcome.posts_analyzed);
    println!("Run folder: {}", outcome.run_folder.display());
    println!("Report: {}", outcome.analysis_file.display());
    if let Some(audio) = &outcome.audio_file {
        println!("Audio: {}", audio.display());
    }
    Ok(())
}

async fn schedule_status(settings: Settings) -> Result<()> {
    let state = ScheduleStore::new(&settings.schedule_file).load().await?;
    let tz = state.validate()?;

    println!("Enabled: {}", if state.enabled { "yes" } else { "no" });
    println!("Scheduled time: {} ({})", state.scheduled_time(), state.timezone);
    match state.next_run(Utc::now()) {
        Some(next) => println!(
            "Next run: {}",
            next.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z")
        ),
        None => println!("Next run: not scheduled"),
    }
    println!("Subreddits: {}", state.config.subreddits);

    if let Some(last) = &state.last_run {
        println!(
            "Last run: {:?} at {}",
            last.status,
            last.finished.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z")
        );
        if let Some(folder) = &last.run_folder {
            println!("Last run folder: {}", folder.display());
        }
        if let Some(error) = &last.error {
            println!("Last error: {}", error);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
