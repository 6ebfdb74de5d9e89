//! Hoax Detector Service: Binary Entrypoint
//! Boots the Axum HTTP server: loads config and the active artifact generation,
//! wires shared state, mounts `/metrics`.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;

use hoax_detector::api::{self, AppState};
use hoax_detector::artifacts::{ArtifactHandle, ArtifactStore};
use hoax_detector::config::DetectorConfig;
use hoax_detector::engine::Detector;
use hoax_detector::feedback::FeedbackRecorder;
use hoax_detector::fetch::HttpFetcher;
use hoax_detector::metrics::Metrics;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    hoax_detector::init_tracing();

    let cfg = DetectorConfig::load_default()?;
    tracing::info!(
        policy = cfg.decision_policy().name(),
        artifacts = %cfg.paths.artifacts_dir.display(),
        "detector config loaded"
    );

    // Boot without a model if none is committed yet; /detect answers 503 until a reload.
    let store = ArtifactStore::new(&cfg.paths.artifacts_dir);
    let handle = ArtifactHandle::empty();
    if let Err(e) = handle.reload_from(&store) {
        tracing::warn!(error = %e, "no artifact generation loaded; run `retrain` then POST /admin/reload-artifacts");
    }

    let prom = Metrics::init()?;
    if let Some(g) = handle.generation() {
        metrics::gauge!("artifact_generation").set(g as f64);
    }

    let detector = Detector::new(handle, cfg.trust_adjuster(), cfg.decision_policy());
    let fetcher = HttpFetcher::new(cfg.fetch_timeout()).map_err(anyhow::Error::from)?;

    let state = AppState {
        detector: Arc::new(detector),
        recorder: Arc::new(FeedbackRecorder::new(&cfg.paths.feedback_log)),
        store,
        fetcher: Arc::new(fetcher),
    };
    let router = api::router(state).merge(prom.router());

    Ok(router.into())
}
