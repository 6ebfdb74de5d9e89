// src/api.rs
//! HTTP adapter over the detection pipeline and the feedback recorder.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::artifacts::ArtifactStore;
use crate::decision::Label;
use crate::engine::{Article, ArticleInput, Detection, Detector};
use crate::error::Error;
use crate::feedback::{FeedbackRecorder, UserLabel};
use crate::fetch::PageFetcher;

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<Detector>,
    pub recorder: Arc<FeedbackRecorder>,
    pub store: ArtifactStore,
    pub fetcher: Arc<dyn PageFetcher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/detect", post(detect))
        .route("/report", post(report))
        .route("/admin/reload-artifacts", post(admin_reload_artifacts))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error → HTTP status. The body always carries `error` and `kind`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidArticle(_) => StatusCode::BAD_REQUEST,
            Error::Fetch(_) => StatusCode::BAD_GATEWAY,
            Error::Artifacts(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::RetrainInProgress => StatusCode::CONFLICT,
            Error::DegenerateTraining { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Persistence { .. } | Error::Schema { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, kind = self.0.kind(), "request failed");
        }
        let body = json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct DetectResp {
    #[serde(flatten)]
    detection: Detection,
    /// Text actually classified (fetched when only a URL was given).
    body: String,
}

async fn detect(
    State(state): State<AppState>,
    Json(input): Json<ArticleInput>,
) -> Result<Json<DetectResp>, ApiError> {
    match state.detector.detect_input(input, state.fetcher.as_ref()).await {
        Ok((article, detection)) => Ok(Json(DetectResp {
            detection,
            body: article.body,
        })),
        Err(e) => {
            counter!("detect_errors_total", "kind" => e.kind()).increment(1);
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
struct ReportReq {
    title: String,
    #[serde(default)]
    url: Option<String>,
    body: String,
    predicted_label: String,
    user_label: String,
    /// Echo of the shown decision; the logged flag is recomputed from the allow-list.
    #[serde(default)]
    trusted_source: Option<bool>,
}

async fn report(
    State(state): State<AppState>,
    Json(req): Json<ReportReq>,
) -> Response {
    let Some(user_label) = UserLabel::parse(&req.user_label) else {
        return unprocessable(format!(
            "user_label must be \"Valid\" or \"Hoaks\", got {:?}",
            req.user_label
        ));
    };
    let Some(predicted_label) = parse_predicted(&req.predicted_label) else {
        return unprocessable(format!("unknown predicted_label {:?}", req.predicted_label));
    };
    let article = match Article::new(req.title, req.body, req.url) {
        Ok(a) => a,
        Err(e) => return ApiError(e).into_response(),
    };

    let trusted = state.detector.trust().is_trusted(article.source_url.as_deref());
    if req.trusted_source.is_some_and(|claimed| claimed != trusted) {
        tracing::debug!(
            target: "feedback",
            claimed = ?req.trusted_source,
            trusted,
            "client trusted_source ignored"
        );
    }

    // Blocking fs + fsync off the async workers.
    let recorder = state.recorder.clone();
    let joined = tokio::task::spawn_blocking(move || {
        recorder.record_reported(&article, predicted_label, user_label, trusted)
    })
    .await;
    match joined {
        Ok(Ok(rec)) => (StatusCode::CREATED, Json(rec)).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(join) => {
            tracing::warn!(error = %join, "feedback append task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "feedback append aborted", "kind": "persistence" })),
            )
                .into_response()
        }
    }
}

/// Accepts both the wire spelling (`HOAX`) and the log spelling (`Hoaks`).
fn parse_predicted(s: &str) -> Option<Label> {
    match s.trim().to_ascii_uppercase().as_str() {
        "VALID" => Some(Label::Valid),
        "HOAX" | "HOAKS" => Some(Label::Hoax),
        "UNCERTAIN" => Some(Label::Uncertain),
        _ => None,
    }
}

fn unprocessable(msg: String) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": msg, "kind": "invalid_label" })),
    )
        .into_response()
}

async fn admin_reload_artifacts(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let generation = state.detector.artifacts().reload_from(&state.store)?;
    gauge!("artifact_generation").set(generation as f64);
    Ok(Json(json!({ "generation": generation })))
}
