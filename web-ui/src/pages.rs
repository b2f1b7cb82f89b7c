//! Template environment and the view models the pages render.

use crate::error::WebError;
use crate::forms::PipelineForm;
use background_service::ScheduleStatus;
use digest_core::defaults::{MODEL_MAX_TOKENS, TTS_MODELS};
use digest_core::{CoreError, ErrorExt, RunOutcome, TimeFilter};
use minijinja::{context, Environment};
use serde::Serialize;
use std::path::Path;

pub(crate) const INDEX_TEMPLATE: &str = "index.html";
pub(crate) const RESULT_TEMPLATE: &str = "result.html";

pub(crate) fn environment() -> Result<Environment<'static>, WebError> {
    let mut env = Environment::new();
    env.add_template("base.html", include_str!("../templates/base.html"))?;
    env.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;
    env.add_template(RESULT_TEMPLATE, include_str!("../templates/result.html"))?;
    Ok(env)
}

/// A file from a run folder offered for download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub href: String,
}

/// What the page shows about the most recent manual run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunView {
    pub success: bool,
    pub folder: Option<String>,
    pub posts_analyzed: usize,
    pub analysis: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub error: Option<String>,
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl RunView {
    pub fn from_result(result: &Result<RunOutcome, CoreError>) -> Self {
        match result {
            Ok(outcome) => {
                let folder = file_name(&outcome.run_folder);
                let files = [
                    Some(&outcome.analysis_file),
                    Some(&outcome.raw_data_file),
                    Some(&outcome.llm_input_file),
                    outcome.email_file.as_ref(),
                    outcome.audio_file.as_ref(),
                ];
                let artifacts = match &folder {
                    Some(folder) => files
                        .into_iter()
                        .flatten()
                        .filter_map(|path| file_name(path.as_path()))
                        .map(|name| Artifact {
                            href: format!("/runs/{}/{}", folder, name),
                            name,
                        })
                        .collect(),
                    None => Vec::new(),
                };

                Self {
                    success: true,
                    folder,
                    posts_analyzed: outcome.posts_analyzed,
                    analysis: Some(outcome.analysis.clone()),
                    artifacts,
                    error: None,
                }
            }
            Err(e) => Self {
                success: false,
                folder: None,
                posts_analyzed: 0,
                analysis: None,
                artifacts: Vec::new(),
                error: Some(e.user_friendly_message()),
            },
        }
    }
}

/// One-line feedback after a schedule action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub success: bool,
    pub text: String,
}

impl Notice {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Options for the select inputs.
#[derive(Debug, Clone, Serialize)]
struct Choices {
    time_filters: Vec<&'static str>,
    models: Vec<&'static str>,
    tts_models: &'static [&'static str],
    voices: &'static [&'static str],
}

impl Choices {
    fn new() -> Self {
        Self {
            time_filters: TimeFilter::ALL.iter().map(TimeFilter::as_str).collect(),
            models: MODEL_MAX_TOKENS.iter().map(|(name, _)| *name).collect(),
            tts_models: TTS_MODELS,
            voices: tts_service::available_voices(),
        }
    }
}

pub(crate) struct IndexPage<'a> {
    pub form: &'a PipelineForm,
    pub status: &'a ScheduleStatus,
    pub missing: &'a [&'static str],
    pub last_result: Option<&'a RunView>,
    pub notice: Option<&'a Notice>,
}

pub(crate) fn render_index(
    env: &Environment<'_>,
    page: IndexPage<'_>,
) -> Result<String, WebError> {
    let template = env.get_template(INDEX_TEMPLATE)?;
    Ok(template.render(context! {
        form => page.form,
        status => page.status,
        missing => page.missing,
        last_result => page.last_result,
        notice => page.notice,
        choices => Choices::new(),
    })?)
}

pub(crate) fn render_result(
    env: &Environment<'_>,
    form: &PipelineForm,
    view: &RunView,
) -> Result<String, WebError> {
    let template = env.get_template(RESULT_TEMPLATE)?;
    Ok(template.render(context! {
        form => form,
        run => view,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use digest_core::LlmError;
    use std::path::PathBuf;

    fn outcome() -> RunOutcome {
        let folder = PathBuf::from("outputs/run_2024-10-15_07-00-00");
        RunOutcome {
            analysis_file: folder.join("analysis.txt"),
            raw_data_file: folder.join("raw_data.txt"),
            llm_input_file: folder.join("llm_input.txt"),
            email_file: None,
            audio_file: Some(folder.join("audio.wav")),
            run_folder: folder,
            posts_analyzed: 4,
            analysis: "<b>report</b>".to_string(),
        }
    }

    #[test]
    fn test_run_view_lists_artifacts() {
        let view = RunView::from_result(&Ok(outcome()));
        assert!(view.success);
        assert_eq!(view.folder.as_deref(), Some("run_2024-10-15_07-00-00"));
        let names: Vec<&str> = view.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["analysis.txt", "raw_data.txt", "llm_input.txt", "audio.wav"]
        );
        assert_eq!(
            view.artifacts[3].href,
            "/runs/run_2024-10-15_07-00-00/audio.wav"
        );
    }

    #[test]
    fn test_run_view_failure() {
        let err = CoreError::Llm(LlmError::AnalysisTooShort {
            length: 12,
            minimum: 100,
        });
        let view = RunView::from_result(&Err(err));
        assert!(!view.success);
        assert!(view.artifacts.is_empty());
        assert!(view.error.is_some());
    }

    #[test]
    fn test_result_page_escapes_analysis() {
        let env = environment().unwrap();
        let html = render_result(
            &env,
            &PipelineForm::default(),
            &RunView::from_result(&Ok(outcome())),
        )
        .unwrap();
        assert!(html.contains("&lt;b&gt;report"));
        assert!(!html.contains("<b>report"));
        assert!(html.contains("run_2024-10-15_07-00-00"));
        assert!(html.contains("analysis.txt"));
    }
}
