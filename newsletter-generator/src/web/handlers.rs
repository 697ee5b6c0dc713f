use crate::config::RunOverrides;
use crate::generator::{render_markdown, RenderOptions};
use crate::pipeline::{OutputFile, PipelineStage};
use crate::profile::{analyze_interests, InterestAnalysis};
use crate::types::{NewsletterError, OutputFormat, UserProfile};
use crate::web::AppState;
use crate::workflow::{Trigger, Workflow, WorkflowError, WorkflowState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// JSON error body with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<NewsletterError> for ApiError {
    fn from(error: NewsletterError) -> Self {
        let status = match &error {
            NewsletterError::ProfileNotFound { .. } => StatusCode::NOT_FOUND,
            NewsletterError::InvalidProfileName { .. } | NewsletterError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        Self::new(StatusCode::CONFLICT, error.to_string())
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: Option<WorkflowState>,
    pub interests: Vec<String>,
    pub overrides: Option<RunOverrides>,
    pub stage: Option<PipelineStage>,
    pub run_id: Option<Uuid>,
    pub failure: Option<String>,
    pub outputs: Vec<OutputFile>,
    pub article_count: usize,
    pub degraded_count: usize,
    pub offline: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InterestsRequest {
    /// Free text, analyzed into interests
    pub text: Option<String>,
    pub interests: Option<Vec<String>>,
    /// Saved profile to start from
    pub profile: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InterestsResponse {
    pub state: WorkflowState,
    pub interests: Vec<String>,
    pub analysis: Option<InterestAnalysis>,
}

#[derive(Debug, Deserialize)]
pub struct SaveProfileRequest {
    pub name: String,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    let workflow = session.workflow.as_ref();
    let report = session.last_report.as_ref();

    Json(StatusResponse {
        state: workflow.map(Workflow::state),
        interests: workflow.map(|w| w.interests().to_vec()).unwrap_or_default(),
        overrides: workflow.map(|w| w.overrides().clone()),
        stage: session.progress.as_ref().map(|progress| *progress.borrow()),
        run_id: workflow.and_then(Workflow::current_run),
        failure: workflow.and_then(|w| w.failure().map(str::to_string)),
        outputs: report.map(|r| r.outputs.clone()).unwrap_or_default(),
        article_count: report.map(|r| r.document.article_count()).unwrap_or(0),
        degraded_count: report.map(|r| r.degraded_count).unwrap_or(0),
        offline: state.pipeline.is_offline(),
    })
}

pub async fn enter_interests(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InterestsRequest>,
) -> ApiResult<Json<InterestsResponse>> {
    let loaded = match &request.profile {
        Some(name) => Some(state.store.load(name)?),
        None => None,
    };

    let mut analysis = None;
    let interests = if let Some(text) = request.text.as_deref().filter(|text| !text.trim().is_empty()) {
        let result = analyze_interests(text)?;
        let interests = result.interests.clone();
        analysis = Some(result);
        interests
    } else if let Some(interests) = request.interests {
        interests
            .into_iter()
            .map(|interest| interest.trim().to_string())
            .filter(|interest| !interest.is_empty())
            .collect()
    } else if let Some(profile) = &loaded {
        profile.interests.clone()
    } else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "no interests given"));
    };

    let mut session = state.session.write().await;
    let next = match session.workflow.as_mut() {
        Some(workflow) => workflow.apply(Trigger::EnterInterests(interests.clone()))?,
        None => {
            let workflow = Workflow::new(interests.clone());
            let next = workflow.state();
            session.workflow = Some(workflow);
            next
        }
    };
    session.profile = loaded;

    info!("Interests entered: {:?}", interests);
    Ok(Json(InterestsResponse {
        state: next,
        interests,
        analysis,
    }))
}

pub async fn configure(
    State(state): State<Arc<AppState>>,
    Json(overrides): Json<RunOverrides>,
) -> ApiResult<Json<serde_json::Value>> {
    state.config.with_overrides(&overrides)?;

    let mut session = state.session.write().await;
    let workflow = session
        .workflow
        .as_mut()
        .ok_or_else(|| ApiError::new(StatusCode::CONFLICT, "enter interests first"))?;
    let next = workflow.apply(Trigger::Configure(overrides))?;
    Ok(Json(serde_json::json!({ "state": next })))
}

pub async fn generate(State(state): State<Arc<AppState>>) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut session = state.session.write().await;
    let overrides = match session.workflow.as_ref() {
        Some(workflow) => workflow.overrides().clone(),
        None => return Err(ApiError::new(StatusCode::CONFLICT, "enter interests first")),
    };
    let config = state.config.with_overrides(&overrides)?;
    let profile = session.run_profile();
    let options = RenderOptions::from_config(&config.newsletter, &config.summarization);

    let (next, run_id) = match session.workflow.as_mut() {
        Some(workflow) => {
            let next = workflow.apply(Trigger::StartGeneration)?;
            (next, workflow.current_run())
        }
        None => return Err(ApiError::new(StatusCode::CONFLICT, "enter interests first")),
    };
    let run_id = run_id.ok_or_else(|| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "run was not started"))?;

    let (progress_tx, progress_rx) = watch::channel(PipelineStage::Idle);
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let result = task_state
            .pipeline
            .run_with_progress(&config, &profile, Some(&progress_tx))
            .await;
        task_state.session.write().await.finish(run_id, result);
    });

    session.task = Some(handle);
    session.progress = Some(progress_rx);
    session.last_report = None;
    session.run_options = Some(options);
    info!("Started generation {}", run_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "state": next, "run_id": run_id })),
    ))
}

pub async fn cancel(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let mut session = state.session.write().await;
    let workflow = session
        .workflow
        .as_mut()
        .ok_or_else(|| ApiError::new(StatusCode::CONFLICT, "nothing to cancel"))?;
    let next = workflow.apply(Trigger::Cancel)?;

    if let Some(task) = session.task.take() {
        task.abort();
        warn!("Generation cancelled");
    }
    Ok(Json(serde_json::json!({ "state": next })))
}

pub async fn preview(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let session = state.session.read().await;
    let report = session
        .last_report
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "no newsletter generated yet"))?;

    let options = session
        .run_options
        .unwrap_or_else(|| RenderOptions::from_config(&state.config.newsletter, &state.config.summarization));
    let markdown = render_markdown(&report.document, &options);
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], markdown).into_response())
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
) -> ApiResult<Response> {
    let format: OutputFormat = format
        .parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, format!("unknown format: {}", format)))?;

    let path = {
        let session = state.session.read().await;
        session
            .last_report
            .as_ref()
            .and_then(|report| report.output_for(format))
            .map(|output| output.path.clone())
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no {} output available", format)))?
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::from(NewsletterError::from(e)))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("newsletter.{}", format.extension()));
    let content_type = match format {
        OutputFormat::Markdown => "text/markdown; charset=utf-8",
        OutputFormat::Pdf => "application/pdf",
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        bytes,
    )
        .into_response())
}

pub async fn list_profiles(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.list()?))
}

pub async fn save_profile(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveProfileRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let interests = match (request.interests, request.text) {
        (Some(interests), _) => interests,
        (None, Some(text)) => analyze_interests(&text)?.interests,
        (None, None) => {
            let session = state.session.read().await;
            session
                .workflow
                .as_ref()
                .map(|workflow| workflow.interests().to_vec())
                .unwrap_or_default()
        }
    };

    let mut profile = match state.store.load(&request.name) {
        Ok(mut existing) => {
            existing.interests = interests;
            existing
        }
        Err(NewsletterError::ProfileNotFound { .. }) => UserProfile::new(request.name.trim(), interests),
        Err(e) => return Err(e.into()),
    };
    state.store.save(&mut profile)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Newsletter Generator</title>
<style>
body { font-family: sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; }
textarea, input { width: 100%; margin-bottom: .5rem; }
pre { background: #f4f4f4; padding: 1rem; white-space: pre-wrap; }
button { margin-right: .5rem; }
</style>
</head>
<body>
<h1>Newsletter Generator</h1>
<section>
  <h2>1. Interests</h2>
  <textarea id="interests" rows="3" placeholder="AI, space exploration, climate"></textarea>
  <button onclick="enterInterests()">Use these interests</button>
</section>
<section>
  <h2>2. Options</h2>
  <label>Max articles <input id="max_articles" type="number" min="1" value="10"></label>
  <button onclick="configure()">Apply</button>
</section>
<section>
  <h2>3. Generate</h2>
  <button onclick="post('/api/generate')">Generate</button>
  <button onclick="post('/api/cancel')">Cancel</button>
  <a href="/api/download/markdown">Markdown</a> | <a href="/api/download/pdf">PDF</a>
</section>
<h2>Status</h2>
<pre id="status"></pre>
<h2>Preview</h2>
<pre id="preview"></pre>
<script>
async function post(path, body) {
  const res = await fetch(path, { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body || {}) });
  document.getElementById('status').textContent = JSON.stringify(await res.json(), null, 2);
}
function enterInterests() { post('/api/interests', { text: document.getElementById('interests').value }); }
function configure() { post('/api/configure', { max_articles: parseInt(document.getElementById('max_articles').value, 10) }); }
async function refresh() {
  const status = await (await fetch('/api/status')).json();
  document.getElementById('status').textContent = JSON.stringify(status, null, 2);
  if (status.state === 'completed') {
    const res = await fetch('/api/preview');
    if (res.ok) document.getElementById('preview').textContent = await res.text();
  }
}
setInterval(refresh, 2000);
refresh();
</script>
</body>
</html>
"#;
