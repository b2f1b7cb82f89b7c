use crate::forms::PipelineForm;
use crate::pages::{self, IndexPage, Notice, RunView};
use crate::{AppState, WebError};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::{Form, Json};
use background_service::ScheduleStatus;
use digest_core::ErrorExt;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

async fn index_page(
    state: &AppState,
    form: &PipelineForm,
    notice: Option<Notice>,
) -> Result<Html<String>, WebError> {
    let status = state.scheduler.status().await;
    let missing = state
        .pipeline
        .settings()
        .missing_for_run(form.model.trim(), form.send_to_chat);
    let last_result = state.last_result.lock().await;

    let html = pages::render_index(
        &state.templates,
        IndexPage {
            form,
            status: &status,
            missing: &missing,
            last_result: last_result.as_ref(),
            notice: notice.as_ref(),
        },
    )?;
    Ok(Html(html))
}

pub(crate) async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, WebError> {
    let saved = state.scheduler.state().await;
    index_page(&state, &PipelineForm::from_schedule(&saved), None).await
}

/// Runs the pipeline inside the request and renders the report.
pub(crate) async fn run_now(
    State(state): State<Arc<AppState>>,
    Form(form): Form<PipelineForm>,
) -> Result<Html<String>, WebError> {
    info!("Manual run requested");
    let result = state.pipeline.run(&form.to_run_config()).await;
    let view = RunView::from_result(&result);

    let html = pages::render_result(&state.templates, &form, &view)?;
    *state.last_result.lock().await = Some(view);
    Ok(Html(html))
}

pub(crate) async fn enable_schedule(
    State(state): State<Arc<AppState>>,
    Form(form): Form<PipelineForm>,
) -> Result<Html<String>, WebError> {
    let enabled = state
        .scheduler
        .enable(
            form.schedule_hour,
            form.schedule_minute,
            &form.timezone,
            form.to_run_config(),
        )
        .await;

    let notice = match enabled {
        Ok(status) => Notice::ok(format!(
            "Daily analysis scheduled at {} ({}). Next run: {}",
            status.scheduled_time,
            status.timezone,
            status.next_run.as_deref().unwrap_or("when the scheduler starts")
        )),
        Err(e) => {
            warn!("Rejected schedule: {}", e);
            Notice::failed(format!(
                "Could not enable schedule: {}",
                e.user_friendly_message()
            ))
        }
    };
    index_page(&state, &form, Some(notice)).await
}

pub(crate) async fn disable_schedule(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, WebError> {
    let notice = match state.scheduler.disable().await {
        Ok(_) => Notice::ok("Daily schedule disabled"),
        Err(e) => Notice::failed(format!(
            "Could not disable schedule: {}",
            e.user_friendly_message()
        )),
    };
    let saved = state.scheduler.state().await;
    index_page(&state, &PipelineForm::from_schedule(&saved), Some(notice)).await
}

pub(crate) async fn schedule_status(State(state): State<Arc<AppState>>) -> Json<ScheduleStatus> {
    Json(state.scheduler.status().await)
}

/// A plain file or folder name: no separators, no parent references.
fn is_single_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn content_type(file: &str) -> &'static str {
    match file.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

pub(crate) async fn download(
    State(state): State<Arc<AppState>>,
    Path((folder, file)): Path<(String, String)>,
) -> Result<Response, WebError> {
    if !is_single_segment(&folder) || !is_single_segment(&file) || !folder.starts_with("run_") {
        return Err(WebError::BadRequest("invalid artifact path".to_owned()));
    }

    let path = state.output_dir().join(&folder).join(&file);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(WebError::NotFound(format!("{}/{}", folder, file)));
        }
        Err(e) => return Err(e.into()),
    };

    let headers = [
        (header::CONTENT_TYPE, content_type(&file).to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.replace('"', "")),
        ),
    ];
    Ok((headers, bytes).into_response())
}
