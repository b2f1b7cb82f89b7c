//! Browser front end: one form page that runs the pipeline and manages the
//! daily schedule, plus downloads of run artifacts.

pub mod error;
pub mod forms;
mod handlers;
pub mod pages;

pub use error::WebError;
pub use forms::PipelineForm;
pub use pages::{Artifact, Notice, RunView};

use axum::routing::{get, post};
use axum::Router;
use background_service::{BackgroundService, Pipeline};
use minijinja::Environment;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<BackgroundService>,
    templates: Environment<'static>,
    last_result: Mutex<Option<RunView>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        scheduler: Arc<BackgroundService>,
    ) -> Result<Self, WebError> {
        Ok(Self {
            pipeline,
            scheduler,
            templates: pages::environment()?,
            last_result: Mutex::new(None),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.pipeline.settings().output_dir
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/run", post(handlers::run_now))
        .route("/schedule/enable", post(handlers::enable_schedule))
        .route("/schedule/disable", post(handlers::disable_schedule))
        .route("/schedule/status", get(handlers::schedule_status))
        .route("/runs/{folder}/{file}", get(handlers::download))
        .with_state(state)
}
