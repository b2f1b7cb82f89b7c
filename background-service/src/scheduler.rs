//! Daily scheduled runs.
//!
//! The schedule lives in one JSON file that is read and written as a whole.
//! A single task sleeps until the next occurrence of the configured local
//! time, runs the pipeline with the saved configuration and records the
//! outcome in `last_run`.

use crate::workflow::Pipeline;
use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use digest_core::defaults::{DEFAULT_SCHEDULE_HOUR, DEFAULT_SCHEDULE_MINUTE, DEFAULT_TIMEZONE};
use digest_core::{parse_timezone, ConfigError, CoreError, ErrorExt, RunConfig, RunOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Source of the current time for the scheduler.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Outcome of the most recent scheduled run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LastRun {
    pub fn from_result(
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        result: &Result<RunOutcome, CoreError>,
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                started,
                finished,
                status: RunStatus::Success,
                run_folder: Some(outcome.run_folder.clone()),
                error: None,
                error_code: None,
            },
            Err(e) => Self {
                started,
                finished,
                status: RunStatus::Failed,
                run_folder: None,
                error: Some(e.user_friendly_message()),
                error_code: Some(e.error_code()),
            },
        }
    }
}

/// Contents of the schedule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub timezone: String,
    pub config: RunConfig,
    pub last_run: Option<LastRun>,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: DEFAULT_SCHEDULE_HOUR,
            minute: DEFAULT_SCHEDULE_MINUTE,
            timezone: DEFAULT_TIMEZONE.to_string(),
            config: RunConfig::default(),
            last_run: None,
        }
    }
}

impl ScheduleState {
    pub fn validate(&self) -> Result<Tz, ConfigError> {
        if self.hour > 23 {
            return Err(ConfigError::InvalidValue {
                field: "hour".to_string(),
                value: self.hour.to_string(),
            });
        }
        if self.minute > 59 {
            return Err(ConfigError::InvalidValue {
                field: "minute".to_string(),
                value: self.minute.to_string(),
            });
        }
        parse_timezone(&self.timezone)
    }

    pub fn scheduled_time(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    /// Next run instant, or `None` when disabled or misconfigured.
    pub fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let tz = self.validate().ok()?;
        next_run_after(now, self.hour, self.minute, tz)
    }
}

/// First instant strictly after `now` at which the wall clock in `tz` reads
/// `hour:minute`. A time skipped by a DST jump runs at the first valid
/// minute after the gap; a repeated time runs at its first occurrence.
pub fn next_run_after(
    now: DateTime<Utc>,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.with_timezone(&tz).date_naive();

    for offset in 0..=2 {
        let date = today + ChronoDuration::days(offset);
        let mut local = date.and_time(time);

        let candidate = loop {
            match tz.from_local_datetime(&local) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => break Some(t),
                LocalResult::None => {
                    local += ChronoDuration::minutes(1);
                    if local.date() != date {
                        break None;
                    }
                }
            }
        };

        if let Some(candidate) = candidate {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return Some(candidate);
            }
        }
    }
    None
}

/// The schedule JSON file.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is the default, disabled schedule.
    pub async fn load(&self) -> Result<ScheduleState, CoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ScheduleState::default());
            }
            Err(e) => return Err(e.into()),
        };

        let state: ScheduleState =
            serde_json::from_str(&contents).map_err(|e| ConfigError::InvalidFormat {
                details: format!("{}: {}", self.path.display(), e),
            })?;
        info!(
            "Loaded schedule: {} {} (enabled: {})",
            state.scheduled_time(),
            state.timezone,
            state.enabled
        );
        Ok(state)
    }

    /// Replace the whole file through a temporary sibling and a rename.
    pub async fn save(&self, state: &ScheduleState) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(
            "Saved schedule: {} {} (enabled: {})",
            state.scheduled_time(),
            state.timezone,
            state.enabled
        );
        Ok(())
    }
}

/// What the status endpoint and CLI report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub running: bool,
    pub run_in_progress: bool,
    pub scheduled_time: String,
    pub timezone: String,
    pub next_run: Option<String>,
    pub current_time: String,
    pub last_run: Option<LastRun>,
}

impl ScheduleStatus {
    pub fn from_state(
        state: &ScheduleState,
        running: bool,
        run_in_progress: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let tz = state.validate().ok();
        let display = |t: DateTime<Utc>| match tz {
            Some(tz) => t.with_timezone(&tz).format(DISPLAY_FORMAT).to_string(),
            None => t.format(DISPLAY_FORMAT).to_string(),
        };

        let next_run = if running {
            state.next_run(now).map(display)
        } else {
            None
        };

        Self {
            enabled: state.enabled,
            running,
            run_in_progress,
            scheduled_time: state.scheduled_time(),
            timezone: state.timezone.clone(),
            next_run,
            current_time: display(now),
            last_run: state.last_run.clone(),
        }
    }
}

struct SchedulerInner {
    pipeline: Arc<Pipeline>,
    store: ScheduleStore,
    state: Mutex<ScheduleState>,
    wake: Notify,
    clock: Clock,
}

impl SchedulerInner {
    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started");
        // A slot that already fired never fires again, even if the clock lags
        let mut fired: Option<DateTime<Utc>> = None;
        loop {
            let now = (self.clock)();
            let after = fired.map_or(now, |at| at.max(now));
            let next = self.state.lock().await.next_run(after);
            let sleep_for = next
                .and_then(|at| (at - now).to_std().ok())
                .unwrap_or(Duration::ZERO);
            if let Some(at) = next {
                info!("Next scheduled run at {}", at);
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wake.notified() => continue,
                _ = tokio::time::sleep(sleep_for), if next.is_some() => {
                    fired = next;
                    self.run_scheduled().await;
                }
            }
        }
        info!("Scheduler stopped");
    }

    async fn run_scheduled(&self) {
        let config = {
            let state = self.state.lock().await;
            RunConfig {
                send_to_chat: true,
                ..state.config.clone()
            }
        };

        info!("Starting scheduled analysis");
        let started = (self.clock)();
        let result = self.pipeline.run(&config).await;
        let last_run = LastRun::from_result(started, (self.clock)(), &result);
        match &result {
            Ok(_) => info!("Scheduled analysis completed"),
            Err(e) => error!("Scheduled analysis failed: {}", e),
        }

        let mut state = self.state.lock().await;
        state.last_run = Some(last_run);
        if let Err(e) = self.store.save(&state).await {
            e.log_error();
        }
    }
}

/// Owns the scheduler task and the persisted schedule.
pub struct BackgroundService {
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl BackgroundService {
    /// Load the schedule file; the task is not started yet.
    pub async fn new(pipeline: Arc<Pipeline>, store: ScheduleStore) -> Self {
        Self::with_clock(pipeline, store, Arc::new(Utc::now)).await
    }

    pub async fn with_clock(pipeline: Arc<Pipeline>, store: ScheduleStore, clock: Clock) -> Self {
        let state = match store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable schedule file: {}", e);
                ScheduleState::default()
            }
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(SchedulerInner {
                pipeline,
                store,
                state: Mutex::new(state),
                wake: Notify::new(),
                clock,
            }),
            task: Mutex::new(None),
            shutdown,
        }
    }

    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            warn!("Scheduler already running");
            return;
        }
        self.shutdown.send_replace(false);
        let receiver = self.shutdown.subscribe();
        *task = Some(tokio::spawn(self.inner.clone().run_loop(receiver)));
    }

    /// Stop the task, waiting for a scheduled run in progress to finish.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            self.shutdown.send_replace(true);
            if let Err(e) = handle.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Save and activate a daily schedule.
    pub async fn enable(
        &self,
        hour: u32,
        minute: u32,
        timezone: &str,
        config: RunConfig,
    ) -> Result<ScheduleStatus, CoreError> {
        config.validate()?;
        let mut state = self.inner.state.lock().await;
        let updated = ScheduleState {
            enabled: true,
            hour,
            minute,
            timezone: timezone.trim().to_string(),
            config,
            last_run: state.last_run.clone(),
        };
        updated.validate()?;

        self.inner.store.save(&updated).await?;
        *state = updated;
        drop(state);

        self.inner.wake.notify_one();
        Ok(self.status().await)
    }

    pub async fn disable(&self) -> Result<ScheduleStatus, CoreError> {
        let mut state = self.inner.state.lock().await;
        let updated = ScheduleState {
            enabled: false,
            ..state.clone()
        };
        self.inner.store.save(&updated).await?;
        *state = updated;
        drop(state);

        self.inner.wake.notify_one();
        Ok(self.status().await)
    }

    pub async fn state(&self) -> ScheduleState {
        self.inner.state.lock().await.clone()
    }

    pub async fn status(&self) -> ScheduleStatus {
        let running = self.is_running().await;
        let state = self.inner.state.lock().await;
        let now = (self.inner.clock)();
        ScheduleStatus::from_state(&state, running, self.inner.pipeline.is_running(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let now = utc(2024, 10, 15, 5, 0);
        assert_eq!(
            next_run_after(now, 7, 0, chrono_tz::Etc::UTC),
            Some(utc(2024, 10, 15, 7, 0))
        );
    }

    #[test]
    fn test_next_run_tomorrow_when_passed() {
        let now = utc(2024, 10, 15, 7, 0);
        assert_eq!(
            next_run_after(now, 7, 0, chrono_tz::Etc::UTC),
            Some(utc(2024, 10, 16, 7, 0))
        );
    }

    #[test]
    fn test_next_run_in_other_timezone() {
        // 07:00 in Berlin (CEST, UTC+2) is 05:00 UTC
        let now = utc(2024, 10, 15, 4, 0);
        assert_eq!(
            next_run_after(now, 7, 0, chrono_tz::Europe::Berlin),
            Some(utc(2024, 10, 15, 5, 0))
        );

        // Already past 07:00 Tokyo time (UTC+9) on the local date
        let now = utc(2024, 10, 15, 0, 0);
        assert_eq!(
            next_run_after(now, 7, 0, chrono_tz::Asia::Tokyo),
            Some(utc(2024, 10, 15, 22, 0))
        );
    }

    #[test]
    fn test_next_run_across_dst_gap() {
        // 02:30 does not exist in Berlin on 2024-03-31; clocks jump to 03:00 CEST
        let now = utc(2024, 3, 30, 23, 0);
        assert_eq!(
            next_run_after(now, 2, 30, chrono_tz::Europe::Berlin),
            Some(utc(2024, 3, 31, 1, 0))
        );
    }

    #[test]
    fn test_next_run_rejects_invalid_time() {
        assert_eq!(next_run_after(Utc::now(), 24, 0, chrono_tz::Etc::UTC), None);
    }

    #[test]
    fn test_state_validation() {
        let state = ScheduleState::default();
        assert_eq!(state.validate().unwrap(), chrono_tz::Etc::UTC);
        assert_eq!(state.scheduled_time(), "07:00");

        let bad_tz = ScheduleState {
            timezone: "Mars/Olympus".to_string(),
            ..ScheduleState::default()
        };
        assert!(matches!(
            bad_tz.validate(),
            Err(ConfigError::UnknownTimezone { .. })
        ));

        let bad_minute = ScheduleState {
            minute: 60,
            ..ScheduleState::default()
        };
        assert!(bad_minute.validate().is_err());
    }

    #[test]
    fn test_disabled_state_has_no_next_run() {
        let state = ScheduleState::default();
        assert_eq!(state.next_run(Utc::now()), None);

        let status = ScheduleStatus::from_state(&state, true, false, utc(2024, 10, 15, 5, 0));
        assert!(!status.enabled);
        assert_eq!(status.next_run, None);
        assert_eq!(status.current_time, "2024-10-15 05:00:00 UTC");
    }

    #[test]
    fn test_status_shows_local_next_run() {
        let state = ScheduleState {
            enabled: true,
            hour: 9,
            minute: 15,
            timezone: "Europe/Berlin".to_string(),
            ..ScheduleState::default()
        };
        let status = ScheduleStatus::from_state(&state, true, false, utc(2024, 10, 15, 5, 0));
        assert_eq!(status.scheduled_time, "09:15");
        assert_eq!(status.next_run.as_deref(), Some("2024-10-15 09:15:00 CEST"));

        // Not running means nothing is going to fire
        let status = ScheduleStatus::from_state(&state, false, false, utc(2024, 10, 15, 5, 0));
        assert_eq!(status.next_run, None);
    }

    #[test]
    fn test_last_run_records_failure() {
        let started = utc(2024, 10, 15, 7, 0);
        let finished = utc(2024, 10, 15, 7, 3);
        let result: Result<RunOutcome, CoreError> = Err(CoreError::RedditApi(
            digest_core::RedditApiError::NoPostsFound { subreddits: 2 },
        ));

        let last = LastRun::from_result(started, finished, &result);
        assert_eq!(last.status, RunStatus::Failed);
        assert_eq!(last.error_code.as_deref(), Some("REDDIT_NO_POSTS"));
        assert!(last.run_folder.is_none());

        let json = serde_json::to_value(&last).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("run_folder").is_none());
    }

    #[tokio::test]
    async fn test_store_roundtrip_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("scheduler/schedule_config.json"));

        assert_eq!(store.load().await.unwrap(), ScheduleState::default());

        let mut state = ScheduleState {
            enabled: true,
            hour: 6,
            minute: 45,
            timezone: "America/New_York".to_string(),
            ..ScheduleState::default()
        };
        state.config.email.password = Some("secret".to_string());
        store.save(&state).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("secret"));
        assert!(raw.contains("\"timezone\": \"America/New_York\""));

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.hour, 6);
        assert_eq!(loaded.minute, 45);
        assert!(loaded.enabled);
        assert_eq!(loaded.config.email.password, None);
    }

    #[tokio::test]
    async fn test_store_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, r#"{"enabled": true, "hour": 8}"#).unwrap();

        let state = ScheduleStore::new(&path).load().await.unwrap();
        assert!(state.enabled);
        assert_eq!(state.hour, 8);
        assert_eq!(state.minute, 0);
        assert_eq!(state.timezone, "Etc/UTC");
        assert_eq!(state.config, RunConfig::default());
    }

    #[tokio::test]
    async fn test_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "not json").unwrap();

        let err = ScheduleStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidFormat { .. })));
    }
}
